//! Cheap per-poll probe for challenge pages. Any surface failure counts as
//! "no hit".

use super::detect::{scan_markers, MarkerScan, SuspiciousVerdict};
use super::markers::{Strength, LIGHT_SELECTORS, LIGHT_TITLE_TOKENS};
use crate::sensing::surface::{Surface, Target};

pub const SNIPPET_MAX_CHARS: usize = 80_000;

/// Leading markup of the target document.
pub const SNIPPET_SCRIPT: &str = r#"(() => {
  const el = document.documentElement;
  if (!el) return "";
  const html = el.outerHTML || "";
  return html.slice(0, 80000);
})()"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightHit {
    pub label: String,
    pub vendor: Option<String>,
    pub strength: Strength,
}

async fn probe_selectors(surface: &dyn Surface, frame: Option<&Target>) -> Option<LightHit> {
    let page = Target::Page;
    for (label, selector, vendor) in LIGHT_SELECTORS {
        for target in std::iter::once(&page).chain(frame) {
            if surface.query_exists(target, selector).await.unwrap_or(false) {
                return Some(LightHit {
                    label: label.to_string(),
                    vendor: Some(vendor.to_string()),
                    strength: Strength::Strong,
                });
            }
        }
    }
    None
}

async fn probe_title(surface: &dyn Surface) -> Option<&'static str> {
    let title = surface.title().await.unwrap_or_default().trim().to_lowercase();
    LIGHT_TITLE_TOKENS.into_iter().find(|token| title.contains(*token))
}

async fn snippet(surface: &dyn Surface, target: &Target) -> String {
    match surface.evaluate(target, SNIPPET_SCRIPT).await {
        Ok(value) => value.as_str().unwrap_or_default().to_string(),
        Err(_) => String::new(),
    }
}

/// Selector probes, then title tokens, then a marker scan of the leading
/// markup of page and frame.
pub async fn light_probe(surface: &dyn Surface, frame: Option<&Target>) -> Option<LightHit> {
    if let Some(hit) = probe_selectors(surface, frame).await {
        return Some(hit);
    }
    if let Some(token) = probe_title(surface).await {
        return Some(LightHit {
            label: format!("title:{token}"),
            vendor: None,
            strength: Strength::Strong,
        });
    }
    let page_snip = snippet(surface, &Target::Page).await;
    let frame_snip = match frame {
        Some(target) => snippet(surface, target).await,
        None => String::new(),
    };
    let scan = scan_markers(&page_snip, &frame_snip);
    scan.hit().then(|| LightHit {
        label: "snippet".to_string(),
        vendor: None,
        strength: scan.strength.unwrap_or(Strength::Weak),
    })
}

/// Full verdict after a light hit: the marker scan of the full markup, or
/// the light hit itself when the scan finds nothing.
pub fn confirm_hit(hit: &LightHit, page_html: &str, frame_html: &str) -> SuspiciousVerdict {
    let scan = scan_markers(page_html, frame_html);
    if scan.hit() {
        return SuspiciousVerdict::from_scan(&scan);
    }
    SuspiciousVerdict::from_scan(&MarkerScan {
        markers_hit: vec![hit.label.clone()],
        vendors: hit.vendor.iter().cloned().collect(),
        strength: Some(hit.strength),
        excerpt: String::new(),
    })
}
