use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::detect::SuspiciousVerdict;
use crate::calendar::{scrape_health, HealthDiag, HealthGrade, SlotSummary};
use crate::config::DiagnosticsConfig;
use crate::sensing::surface::{Surface, Target};
use crate::suspicious::markers::Strength;
use crate::utils::text::{safe_name, truncate_bytes};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Dump when a strong hit comes with a BAD scrape, or a weak hit with any
/// core-missing condition.
pub fn should_dump(summary: &SlotSummary, verdict: &SuspiciousVerdict, frame_url: Option<&str>) -> bool {
    if !verdict.hit {
        return false;
    }
    let health = scrape_health(&HealthDiag::from_summary(summary, frame_url, &[]));
    match verdict.strength {
        Some(Strength::Strong) => health.grade == HealthGrade::Bad,
        Some(Strength::Weak) => health.core_missing,
        None => false,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DumpStats {
    pub saved: u32,
    pub suppressed: u32,
}

#[derive(Default)]
struct QuotaState {
    run: DumpStats,
    items: HashMap<String, DumpStats>,
}

/// Per-run and per-item dump limits. Claiming is one check-and-increment
/// under the lock.
pub struct DiagnosticsQuota {
    max_per_run: i64,
    max_per_item: i64,
    state: Mutex<QuotaState>,
}

impl DiagnosticsQuota {
    pub fn new(max_per_run: i64, max_per_item: i64) -> Self {
        Self {
            max_per_run,
            max_per_item,
            state: Mutex::new(QuotaState::default()),
        }
    }

    pub fn claim(&self, item: &str) -> bool {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let state = &mut *guard;
        let run_saved = state.run.saved as i64;
        let item_saved = state.items.get(item).map_or(0, |s| s.saved) as i64;
        let allowed = self.max_per_run > 0
            && self.max_per_item > 0
            && run_saved < self.max_per_run
            && item_saved < self.max_per_item;

        let item_stats = state.items.entry(item.to_string()).or_default();
        if allowed {
            item_stats.saved += 1;
            state.run.saved += 1;
        } else {
            item_stats.suppressed += 1;
            state.run.suppressed += 1;
        }
        allowed
    }

    pub fn run_stats(&self) -> DumpStats {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).run
    }

    pub fn item_stats(&self, item: &str) -> DumpStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.items.get(item).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpMeta {
    pub group: String,
    pub item_id: String,
    pub page_url: String,
    pub frame_url: String,
    pub markers_hit: Vec<String>,
    pub vendors: Vec<String>,
    pub strength: Option<Strength>,
    pub excerpt: String,
}

pub struct DumpRequest<'a> {
    pub page_html: &'a str,
    pub frame_html: &'a str,
    pub meta: DumpMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpPaths {
    pub page_html: Option<PathBuf>,
    pub frame_html: Option<PathBuf>,
    pub page_png: Option<PathBuf>,
    pub frame_png: Option<PathBuf>,
    pub meta_json: Option<PathBuf>,
}

/// Writes markup, screenshots and metadata of a suspicious page under
/// `debug/suspicious/{run_id}/{group}/{item}/`.
pub struct DiagnosticsSink {
    root: PathBuf,
    config: DiagnosticsConfig,
    quota: DiagnosticsQuota,
}

impl DiagnosticsSink {
    pub fn new(root: PathBuf, config: DiagnosticsConfig) -> Self {
        let quota = DiagnosticsQuota::new(config.max_per_run, config.max_per_item);
        Self { root, config, quota }
    }

    pub fn quota(&self) -> &DiagnosticsQuota {
        &self.quota
    }

    /// Best effort: a failed artifact is logged and skipped. `None` when
    /// disabled or over quota.
    pub async fn dump(
        &self,
        surface: &dyn Surface,
        frame: Option<&Target>,
        request: DumpRequest<'_>,
    ) -> Option<DumpPaths> {
        if !self.config.enabled {
            return None;
        }
        let item = request.meta.item_id.clone();
        if !self.quota.claim(&item) {
            log_info!("suspicious dump suppressed item={}", item);
            return None;
        }

        let dir = self
            .root
            .join(safe_name(&request.meta.group))
            .join(safe_name(&item));
        if let Err(err) = tokio::fs::create_dir_all(&dir).await {
            log_warn!("suspicious dump dir failed dir={} err={}", dir.display(), err);
            return None;
        }
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let prefix = |suffix: &str| dir.join(format!("{stamp}_{suffix}"));
        let mut paths = DumpPaths::default();

        let max = self.config.max_html_bytes;
        for (html, suffix, slot) in [
            (request.page_html, "page.html", &mut paths.page_html),
            (request.frame_html, "frame.html", &mut paths.frame_html),
        ] {
            let html = truncate_bytes(html, max);
            if html.is_empty() {
                continue;
            }
            let path = prefix(suffix);
            if write_artifact(&path, html.as_bytes()).await.is_ok() {
                *slot = Some(path);
            }
        }

        let mut shots = vec![(Target::Page, "page.png")];
        if let Some(frame) = frame {
            shots.push((frame.clone(), "frame.png"));
        }
        for (target, suffix) in shots {
            let path = prefix(suffix);
            let saved = match surface.screenshot(&target).await {
                Ok(png) => write_artifact(&path, &png).await.is_ok(),
                Err(err) => {
                    log_warn!("suspicious screenshot failed item={} err={}", item, err);
                    false
                }
            };
            if saved {
                match target {
                    Target::Page => paths.page_png = Some(path),
                    Target::Frame(_) => paths.frame_png = Some(path),
                }
            }
        }

        let meta_path = prefix("meta.json");
        let meta_written = match serde_json::to_vec_pretty(&request.meta) {
            Ok(bytes) => write_artifact(&meta_path, &bytes).await.is_ok(),
            Err(_) => false,
        };
        if meta_written {
            paths.meta_json = Some(meta_path);
        }

        log_info!("suspicious dump saved item={} dir={}", item, dir.display());
        Some(paths)
    }
}

async fn write_artifact(path: &Path, bytes: &[u8]) -> Result<()> {
    let result = tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()));
    if let Err(err) = &result {
        log_warn!("{err:#}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn quota_limits_run_and_item() {
        let quota = DiagnosticsQuota::new(3, 2);
        assert!(quota.claim("a"));
        assert!(quota.claim("a"));
        assert!(!quota.claim("a"));
        assert!(quota.claim("b"));
        assert!(!quota.claim("c"));
        assert_eq!(quota.run_stats(), DumpStats { saved: 3, suppressed: 2 });
        assert_eq!(quota.item_stats("a"), DumpStats { saved: 2, suppressed: 1 });
        assert_eq!(quota.item_stats("zzz"), DumpStats::default());
    }

    #[test]
    fn non_positive_limit_suppresses_everything() {
        let quota = DiagnosticsQuota::new(0, 2);
        assert!(!quota.claim("a"));
        let quota = DiagnosticsQuota::new(4, -1);
        assert!(!quota.claim("a"));
        assert_eq!(quota.run_stats(), DumpStats { saved: 0, suppressed: 1 });
    }

    #[test]
    fn concurrent_claims_never_exceed_run_limit() {
        let quota = Arc::new(DiagnosticsQuota::new(4, 100));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let quota = Arc::clone(&quota);
                std::thread::spawn(move || quota.claim(&format!("item{i}")))
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(granted, 4);
        assert_eq!(quota.run_stats().suppressed, 12);
    }

    #[test]
    fn dump_decision() {
        let strong = SuspiciousVerdict {
            hit: true,
            strength: Some(Strength::Strong),
            ..SuspiciousVerdict::default()
        };
        let weak = SuspiciousVerdict {
            strength: Some(Strength::Weak),
            ..strong.clone()
        };
        let broken = SlotSummary::failed("no table");
        let mut healthy = SlotSummary::from_counts(10, 10, 0, 20, 0);
        healthy.header_dates = 7;
        let mut thin = healthy.clone();
        thin.header_dates = 1;

        assert!(should_dump(&broken, &strong, None));
        assert!(!should_dump(&healthy, &strong, None));
        assert!(!should_dump(&thin, &strong, None));
        assert!(should_dump(&thin, &weak, None));
        assert!(!should_dump(&healthy, &weak, None));
        assert!(!should_dump(&broken, &SuspiciousVerdict::clear(), None));
    }
}
