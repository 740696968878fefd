use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Strong,
    Weak,
}

impl Strength {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strength::Strong => "strong",
            Strength::Weak => "weak",
        }
    }
}

pub enum Matcher {
    /// Substring of the ASCII-lowercased markup
    Token(&'static str),
    /// Case-insensitive pattern over the raw markup
    Pattern(&'static LazyLock<Regex>),
}

pub struct Marker {
    pub label: &'static str,
    pub matcher: Matcher,
    pub vendor: Option<&'static str>,
    pub strength: Strength,
}

static ROBOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)are you a robot|not a robot|robot check").expect("static regex")
});

const fn token(
    label: &'static str,
    vendor: Option<&'static str>,
    strength: Strength,
) -> Marker {
    Marker {
        label,
        matcher: Matcher::Token(label),
        vendor,
        strength,
    }
}

use Strength::{Strong, Weak};

/// Scanned in order. The first matching marker positions the excerpt.
pub static MARKERS: [Marker; 19] = [
    token("cf-chl", Some("cloudflare"), Strong),
    token("cf-turnstile", Some("cloudflare"), Strong),
    token("challenges.cloudflare.com", Some("cloudflare"), Strong),
    token("turnstile", Some("turnstile"), Strong),
    token("hcaptcha", Some("hcaptcha"), Strong),
    token("recaptcha", Some("recaptcha"), Weak),
    token("captcha", None, Weak),
    token("access denied", None, Strong),
    token("forbidden", None, Strong),
    token("too many requests", None, Strong),
    token("blocked", None, Strong),
    token("enable javascript", None, Weak),
    token("please enable cookies", None, Weak),
    token("attention required", Some("cloudflare"), Strong),
    token("verify you are human", None, Strong),
    token("unusual traffic", None, Strong),
    token("datadome", Some("datadome"), Strong),
    token("perimeterx", Some("perimeterx"), Strong),
    Marker {
        label: "robot check",
        matcher: Matcher::Pattern(&ROBOT_RE),
        vendor: None,
        strength: Strong,
    },
];

/// Challenge widgets probed with a selector on the page and then the frame:
/// (label, selector, vendor).
pub const LIGHT_SELECTORS: [(&str, &str, &str); 5] = [
    (
        "cf_challenge_iframe",
        "iframe[src*='challenges.cloudflare.com']",
        "cloudflare",
    ),
    ("cf_turnstile", "[name='cf-turnstile-response']", "cloudflare"),
    ("cf_challenge_dom", "#cf-challenge", "cloudflare"),
    ("recaptcha", "iframe[src*='recaptcha']", "recaptcha"),
    ("hcaptcha", "iframe[src*='hcaptcha']", "hcaptcha"),
];

/// Lowercased page-title fragments of interstitial pages.
pub const LIGHT_TITLE_TOKENS: [&str; 4] = [
    "attention required",
    "just a moment",
    "verify you are human",
    "access denied",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_is_stable() {
        let labels: Vec<_> = MARKERS.iter().map(|m| m.label).collect();
        assert_eq!(labels.first(), Some(&"cf-chl"));
        assert_eq!(labels.last(), Some(&"robot check"));
        assert_eq!(labels.iter().position(|l| *l == "recaptcha"), Some(5));
    }

    #[test]
    fn robot_pattern_ignores_case() {
        assert!(ROBOT_RE.is_match("Please confirm you are NOT A ROBOT"));
        assert!(!ROBOT_RE.is_match("robotics"));
    }
}
