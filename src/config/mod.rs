pub mod params;
pub mod stabilizer;

pub use params::{RankParams, RankSortMode, ScoreParams};
pub use stabilizer::StabilizerConfig;

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoConfig {
    /// Items scraped at the same time, each on its own page
    pub concurrency: usize,

    /// Minimum gap between any two navigation starts across all workers
    pub min_nav_interval_ms: u64,

    pub headful: bool,
}

impl Default for AutoConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            min_nav_interval_ms: 650,
            headful: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// History lines read back per item when scoring
    pub max_lines: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { max_lines: 200 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub max_per_run: i64,
    pub max_per_item: i64,
    pub max_html_bytes: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_per_run: 4,
            max_per_item: 2,
            max_html_bytes: 200_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DebugConfig {
    pub suspicious: DiagnosticsConfig,
}

/// Everything a run reads from `config.json`. Each section overlays its
/// defaults key by key, so a partial file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub auto: AutoConfig,
    pub score: ScoreParams,
    pub rank: RankParams,
    pub stabilizer: StabilizerConfig,
    pub retention: RetentionConfig,
    pub debug: DebugConfig,
}

impl AppConfig {
    /// Normalized copy handed to a run. Constants are fixed from here on.
    pub fn sanitized(&self) -> Self {
        let mut out = self.clone();
        out.auto.concurrency = self.auto.concurrency.max(1);
        out.score = self.score.sanitized();
        out.rank = self.rank.sanitized();
        out.stabilizer = self.stabilizer.sanitized();
        if out.retention.max_lines == 0 {
            out.retention.max_lines = RetentionConfig::default().max_lines;
        }
        if out.debug.suspicious.max_html_bytes == 0 {
            out.debug.suspicious.max_html_bytes = DiagnosticsConfig::default().max_html_bytes;
        }
        out
    }
}

pub struct ConfigStore {
    data: AppConfig,
}

impl ConfigStore {
    /// Loads `path`, writing the defaults there when the file does not exist.
    pub fn new(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("config {} unreadable ({err}), using defaults", path.display());
                AppConfig::default()
            })
        } else {
            let defaults = AppConfig::default();
            Self::write(path, &defaults)?;
            defaults
        };

        Ok(Self { data })
    }

    pub fn current(&self) -> AppConfig {
        self.data.sanitized()
    }

    fn write(path: &Path, data: &AppConfig) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}
