use serde::{Deserialize, Serialize};

use super::markers::{Matcher, Strength, MARKERS};
use crate::utils::text::{collapse_whitespace, truncate_chars};

pub const SCAN_MAX_CHARS: usize = 200_000;
pub const EXCERPT_CHARS: usize = 180;

/// Result of matching the marker table against page and frame markup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerScan {
    pub markers_hit: Vec<String>,
    pub vendors: Vec<String>,
    pub strength: Option<Strength>,
    pub excerpt: String,
}

impl MarkerScan {
    pub fn hit(&self) -> bool {
        !self.markers_hit.is_empty()
    }
}

/// Scans the first [`SCAN_MAX_CHARS`] of each document. Never fails:
/// empty input gives an empty scan.
pub fn scan_markers(page_html: &str, frame_html: &str) -> MarkerScan {
    let combined = format!(
        "{}\n{}",
        truncate_chars(page_html, SCAN_MAX_CHARS),
        truncate_chars(frame_html, SCAN_MAX_CHARS)
    );
    if combined.trim().is_empty() {
        return MarkerScan::default();
    }
    // ASCII lowering keeps byte offsets aligned with `combined`
    let lower = combined.to_ascii_lowercase();

    let mut scan = MarkerScan::default();
    let mut strengths = Vec::new();
    let mut first_span: Option<(usize, usize)> = None;

    for marker in MARKERS.iter() {
        let span = match &marker.matcher {
            Matcher::Token(token) => lower.find(token).map(|idx| (idx, idx + token.len())),
            Matcher::Pattern(re) => re.find(&combined).map(|m| (m.start(), m.end())),
        };
        let Some(span) = span else { continue };

        if !scan.markers_hit.iter().any(|l| l == marker.label) {
            scan.markers_hit.push(marker.label.to_string());
            strengths.push(marker.strength);
            if let Some(vendor) = marker.vendor {
                if !scan.vendors.iter().any(|v| v == vendor) {
                    scan.vendors.push(vendor.to_string());
                }
            }
        }
        first_span.get_or_insert(span);
    }

    if scan.hit() {
        scan.strength = Some(if strengths.iter().all(|s| *s == Strength::Weak) {
            Strength::Weak
        } else {
            Strength::Strong
        });
    }
    if let Some((start, end)) = first_span {
        scan.excerpt = make_excerpt(&combined, start, end, EXCERPT_CHARS);
    }
    scan
}

/// Window of `max_chars` around a byte span, whitespace collapsed.
pub fn make_excerpt(text: &str, start: usize, end: usize, max_chars: usize) -> String {
    if text.is_empty() || max_chars == 0 || start > end || end > text.len() {
        return String::new();
    }
    let half = (max_chars / 2).max(10);
    let start_char = text[..start].chars().count();
    let end_char = start_char + text[start..end].chars().count();
    let left = start_char.saturating_sub(half);
    let right = end_char + half;

    let window: String = text.chars().skip(left).take(right - left).collect();
    let collapsed = collapse_whitespace(&window);
    truncate_chars(&collapsed, max_chars).trim_end().to_string()
}

/// `vendor` as stored: one name, a list, "unknown" for a vendorless hit,
/// or absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VendorValue {
    One(String),
    Many(Vec<String>),
}

impl VendorValue {
    pub fn from_vendors(hit: bool, vendors: &[String]) -> Option<Self> {
        match vendors {
            [] if hit => Some(VendorValue::One("unknown".to_string())),
            [] => None,
            [one] => Some(VendorValue::One(one.clone())),
            many => Some(VendorValue::Many(many.to_vec())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuspiciousVerdict {
    pub hit: bool,
    pub markers_hit: Vec<String>,
    pub vendor: Option<VendorValue>,
    pub strength: Option<Strength>,
    pub excerpt: String,
}

impl SuspiciousVerdict {
    pub fn clear() -> Self {
        Self::default()
    }

    pub fn from_scan(scan: &MarkerScan) -> Self {
        Self {
            hit: scan.hit(),
            markers_hit: scan.markers_hit.clone(),
            vendor: VendorValue::from_vendors(scan.hit(), &scan.vendors),
            strength: scan.strength,
            excerpt: scan.excerpt.clone(),
        }
    }

    /// Vendors as a flat list, for dump metadata.
    pub fn vendor_list(&self) -> Vec<String> {
        match &self.vendor {
            Some(VendorValue::One(v)) if v != "unknown" => vec![v.clone()],
            Some(VendorValue::Many(vs)) => vs.clone(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_markup_is_clean() {
        let scan = scan_markers("", "  ");
        assert!(!scan.hit());
        assert_eq!(scan.strength, None);
        assert_eq!(SuspiciousVerdict::from_scan(&scan).vendor, None);
    }

    #[test]
    fn strong_marker_wins_over_weak() {
        let scan = scan_markers(
            "<html><title>Attention Required!</title><div class='g-recaptcha'></div></html>",
            "",
        );
        assert_eq!(
            scan.markers_hit,
            vec!["recaptcha", "captcha", "attention required"]
        );
        assert_eq!(scan.vendors, vec!["recaptcha", "cloudflare"]);
        assert_eq!(scan.strength, Some(Strength::Strong));
        let verdict = SuspiciousVerdict::from_scan(&scan);
        assert_eq!(
            verdict.vendor,
            Some(VendorValue::Many(vec!["recaptcha".into(), "cloudflare".into()]))
        );
    }

    #[test]
    fn weak_only_hit_without_vendor() {
        let scan = scan_markers("<noscript>Please enable JavaScript</noscript>", "");
        assert_eq!(scan.markers_hit, vec!["enable javascript"]);
        assert_eq!(scan.strength, Some(Strength::Weak));
        let verdict = SuspiciousVerdict::from_scan(&scan);
        assert_eq!(verdict.vendor, Some(VendorValue::One("unknown".into())));
        assert!(verdict.vendor_list().is_empty());
    }

    #[test]
    fn frame_markup_is_scanned() {
        let scan = scan_markers("<html>calendar</html>", "<p>Are you a robot?</p>");
        assert_eq!(scan.markers_hit, vec!["robot check"]);
        assert!(scan.excerpt.contains("Are you a robot"));
    }

    #[test]
    fn excerpt_is_bounded_and_collapsed() {
        let filler = "x ".repeat(400);
        let text = format!("{filler}\n\n  blocked   here {filler}");
        let scan = scan_markers(&text, "");
        assert!(scan.excerpt.contains("blocked here"));
        assert!(scan.excerpt.chars().count() <= EXCERPT_CHARS);
        assert!(!scan.excerpt.contains("  "));
    }

    #[test]
    fn vendor_shapes() {
        assert_eq!(VendorValue::from_vendors(false, &[]), None);
        assert_eq!(
            VendorValue::from_vendors(true, &["datadome".to_string()]),
            Some(VendorValue::One("datadome".into()))
        );
        let json = serde_json::to_value(SuspiciousVerdict {
            hit: true,
            vendor: VendorValue::from_vendors(true, &[]),
            ..SuspiciousVerdict::default()
        })
        .unwrap();
        assert_eq!(json["vendor"], "unknown");
        assert_eq!(json["markersHit"], serde_json::json!([]));
    }
}
