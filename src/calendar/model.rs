use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::suspicious::SuspiciousVerdict;

/// Classified kind of one calendar cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Bell,
    Maru,
    Tel,
    Dash,
    Other,
    /// "please call" notice cells, kept out of every count except `excluded`
    Excluded,
}

impl SlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::Bell => "bell",
            SlotKind::Maru => "maru",
            SlotKind::Tel => "tel",
            SlotKind::Dash => "dash",
            SlotKind::Other => "other",
            SlotKind::Excluded => "excluded",
        }
    }

    pub fn is_bookable(&self) -> bool {
        matches!(self, SlotKind::Bell | SlotKind::Maru | SlotKind::Tel)
    }
}

/// Per-service-date slot counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateCounts {
    pub bell: u32,
    pub maru: u32,
    pub tel: u32,
    pub other: u32,
}

impl DateCounts {
    pub fn new(bell: u32, maru: u32, tel: u32) -> Self {
        Self {
            bell,
            maru,
            tel,
            other: 0,
        }
    }

    /// bell + maru + tel
    pub fn bookable(&self) -> u32 {
        self.bell + self.maru + self.tel
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StabilizeDetail {
    pub sanity_retries: u32,
    pub sanity_last_reason: Option<String>,
}

/// One calendar scrape result for one item at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlotSummary {
    pub ok: bool,
    pub reason: Option<String>,

    pub bell: u32,
    pub maru: u32,
    pub tel: u32,
    pub dash: u32,
    pub other: u32,
    pub excluded: u32,
    /// bell + maru + tel + dash + other
    pub total: u32,
    /// bell + maru + tel
    pub bookable: u32,

    pub time_rows: u32,
    pub max_cols: u32,
    /// Raw data cells visited, before span expansion
    pub td_count: u32,
    pub header_dates: u32,
    pub slots_unique: u32,

    pub by_date: BTreeMap<NaiveDate, DateCounts>,
    /// Cell text (or kind when blank) to covered slot count
    pub symbols: BTreeMap<String, u32>,

    pub other_ratio: Option<f64>,
    pub bell_rate_total: Option<f64>,
    pub bell_rate_bookable: Option<f64>,

    pub empty_calendar: bool,
    /// Returned at timeout without a settled light signature
    pub unstable: bool,
    pub detail: Option<StabilizeDetail>,
    pub suspicious: Option<SuspiciousVerdict>,
}

impl SlotSummary {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Summary carrying only counts, for scoring inputs and tests.
    pub fn from_counts(bell: u32, maru: u32, tel: u32, dash: u32, other: u32) -> Self {
        let mut summary = Self {
            ok: true,
            bell,
            maru,
            tel,
            dash,
            other,
            ..Self::default()
        };
        summary.recount_totals();
        summary
    }

    pub fn recount_totals(&mut self) {
        self.bookable = self.bell + self.maru + self.tel;
        self.total = self.bookable + self.dash + self.other;
    }

    pub fn expected_slots(&self) -> u32 {
        self.time_rows * self.max_cols
    }

    pub fn signature(&self) -> StabilitySignature {
        StabilitySignature {
            total: self.total,
            bookable: self.bookable,
            bell: self.bell,
            tel: self.tel,
            dash: self.dash,
            other: self.other,
            excluded: self.excluded,
            time_rows: self.time_rows,
            max_cols: self.max_cols,
            td_count: self.td_count,
        }
    }

    pub fn reason_str(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }
}

/// Equality fingerprint of a full evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StabilitySignature {
    pub total: u32,
    pub bookable: u32,
    pub bell: u32,
    pub tel: u32,
    pub dash: u32,
    pub other: u32,
    pub excluded: u32,
    pub time_rows: u32,
    pub max_cols: u32,
    pub td_count: u32,
}

/// Cheap fingerprint of a grid that may still be rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct LightSignature {
    pub td_count: u32,
    pub time_rows: u32,
    pub max_cols: u32,
}

/// Terminal failure codes. `Display` gives the stored `reason` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeReason {
    NotReservable(Option<String>),
    CalendarNotPresent(Option<String>),
    IframeMissing,
    FrameNotDetected,
    SanityFail(String),
    TimeoutUnstable,
    EmptyCalendar,
    NavigationFailed,
}

impl fmt::Display for ScrapeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeReason::NotReservable(Some(detail)) => write!(f, "not_reservable({detail})"),
            ScrapeReason::NotReservable(None) => f.write_str("not_reservable"),
            ScrapeReason::CalendarNotPresent(Some(detail)) => {
                write!(f, "calendar_not_present({detail})")
            }
            ScrapeReason::CalendarNotPresent(None) => f.write_str("calendar_not_present"),
            ScrapeReason::IframeMissing => f.write_str("iframe_missing"),
            ScrapeReason::FrameNotDetected => f.write_str("calendar iframe not detected(timeout)"),
            ScrapeReason::SanityFail(code) => write!(f, "sanity_fail({code})"),
            ScrapeReason::TimeoutUnstable => f.write_str("timeout_unstable"),
            ScrapeReason::EmptyCalendar => f.write_str("empty_calendar(all_dash)"),
            ScrapeReason::NavigationFailed => f.write_str("navigation_failed"),
        }
    }
}

impl ScrapeReason {
    /// Reasons that mean the item has nothing to rank.
    pub fn excludes_from_ranking(reason: &str) -> bool {
        reason == "iframe_missing" || reason.starts_with("not_reservable")
    }
}

impl From<ScrapeReason> for SlotSummary {
    fn from(reason: ScrapeReason) -> Self {
        SlotSummary::failed(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strings_match_stored_codes() {
        assert_eq!(
            ScrapeReason::NotReservable(Some("iframe_src_error".into())).to_string(),
            "not_reservable(iframe_src_error)"
        );
        assert_eq!(
            ScrapeReason::CalendarNotPresent(Some("iframe_no_src".into())).to_string(),
            "calendar_not_present(iframe_no_src)"
        );
        assert_eq!(ScrapeReason::IframeMissing.to_string(), "iframe_missing");
        assert!(ScrapeReason::excludes_from_ranking("not_reservable(page:url_error)"));
        assert!(!ScrapeReason::excludes_from_ranking("sanity_fail(time_rows_range)"));
    }

    #[test]
    fn summary_serializes_camel_case_with_iso_dates() {
        let mut summary = SlotSummary::from_counts(2, 1, 0, 3, 0);
        summary
            .by_date
            .insert(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(), DateCounts::new(2, 1, 0));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["timeRows"], 0);
        assert_eq!(json["total"], 6);
        assert_eq!(json["byDate"]["2026-10-19"]["bell"], 2);
        let back: SlotSummary = serde_json::from_value(json).unwrap();
        assert_eq!(back, summary);
    }
}
