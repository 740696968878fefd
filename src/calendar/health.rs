//! Scrape health (did we read the page correctly?) and signal strength
//! (how much demand information does the grid carry?). The two are kept
//! apart: an all-dash calendar is healthy but carries no signal.

use serde::{Deserialize, Serialize};

use super::model::{DateCounts, SlotSummary};
use super::sanity::looks_all_dash;
use crate::config::ScoreParams;

const HEADER_DATES_MIN: u32 = 3;
const GRADE_OK_MIN: i32 = 80;
const GRADE_WARN_MIN: i32 = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthGrade {
    Ok,
    Warn,
    #[default]
    Bad,
}

impl HealthGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthGrade::Ok => "OK",
            HealthGrade::Warn => "WARN",
            HealthGrade::Bad => "BAD",
        }
    }

    fn from_score(score: i32) -> Self {
        if score >= GRADE_OK_MIN {
            HealthGrade::Ok
        } else if score >= GRADE_WARN_MIN {
            HealthGrade::Warn
        } else {
            HealthGrade::Bad
        }
    }
}

/// Structural facts about a scrape that health is computed from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthDiag {
    pub has_calendar_table: bool,
    pub header_dates: u32,
    pub slots_total: u32,
    pub counts_sum: u32,
    pub parse_errors: Vec<String>,
    pub has_frame: bool,
}

impl HealthDiag {
    pub fn from_summary(s: &SlotSummary, frame_url: Option<&str>, parse_errors: &[String]) -> Self {
        Self {
            has_calendar_table: s.ok || s.time_rows > 0 || s.max_cols > 0 || s.td_count > 0,
            header_dates: s.header_dates,
            slots_total: s.total,
            counts_sum: s.bell + s.maru + s.tel + s.dash + s.other,
            parse_errors: parse_errors.to_vec(),
            has_frame: frame_url.is_some_and(|u| !u.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrapeHealth {
    pub score: i32,
    pub grade: HealthGrade,
    pub reasons: Vec<String>,
    pub core_missing: bool,
}

pub fn scrape_health(diag: &HealthDiag) -> ScrapeHealth {
    let mut score = 100;
    let mut reasons = Vec::new();
    let mut penalize = |cond: bool, points: i32, reason: &str| {
        if cond {
            score -= points;
            reasons.push(reason.to_string());
        }
    };

    penalize(!diag.has_calendar_table, 40, "missing_calendar_table");
    penalize(diag.header_dates < HEADER_DATES_MIN, 25, "header_dates_low");
    penalize(diag.slots_total == 0, 40, "slots_total_zero");
    penalize(diag.counts_sum != diag.slots_total, 30, "slot_count_mismatch");
    penalize(!diag.parse_errors.is_empty(), 30, "parse_errors");

    let score = score.clamp(0, 100);
    // every penalty concerns the core grid
    let core_missing = !reasons.is_empty();
    ScrapeHealth {
        score,
        grade: HealthGrade::from_score(score),
        reasons,
        core_missing,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalDetail {
    pub signal_total: u32,
    pub signal_service_days: u32,
    pub signal_total_sat: f64,
    pub signal_day_sat: f64,
    pub signal_total_factor: f64,
    pub signal_day_factor: f64,
    pub all_dash: bool,
}

/// Demand signal strength in `[0, 100]`.
pub fn signal_strength(s: &SlotSummary, params: &ScoreParams) -> (f64, SignalDetail) {
    let total = s.bell + s.maru + s.tel;
    let mut service_days = s
        .by_date
        .values()
        .filter(|d: &&DateCounts| d.bookable() > 0)
        .count() as u32;
    if service_days == 0 && total > 0 {
        service_days = 1;
    }

    let saturate = |x: f64, sat: f64| if sat > 0.0 { 1.0 - (-x / sat).exp() } else { 1.0 };
    let total_factor = saturate(total as f64, params.bd_total_sat);
    let day_factor = saturate(service_days as f64, params.bd_day_sat);
    let strength = (total_factor * day_factor).clamp(0.0, 1.0) * 100.0;

    let detail = SignalDetail {
        signal_total: total,
        signal_service_days: service_days,
        signal_total_sat: params.bd_total_sat,
        signal_day_sat: params.bd_day_sat,
        signal_total_factor: total_factor,
        signal_day_factor: day_factor,
        all_dash: looks_all_dash(s),
    };
    (strength, detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn all_dash_grid_is_healthy() {
        let mut s = SlotSummary::from_counts(0, 0, 0, 100, 0);
        s.header_dates = 7;
        let health = scrape_health(&HealthDiag::from_summary(&s, Some("https://example.com/frame"), &[]));
        assert_eq!(health.score, 100);
        assert_eq!(health.grade, HealthGrade::Ok);
        assert!(health.reasons.is_empty());
        assert!(!health.core_missing);
    }

    #[test]
    fn failed_scrape_is_bad() {
        let s = SlotSummary::failed("no table");
        let health = scrape_health(&HealthDiag::from_summary(&s, None, &[]));
        assert_eq!(health.score, 0);
        assert_eq!(health.grade, HealthGrade::Bad);
        assert_eq!(
            health.reasons,
            vec!["missing_calendar_table", "header_dates_low", "slots_total_zero"]
        );
        assert!(health.core_missing);
    }

    #[test]
    fn warn_band() {
        let mut s = SlotSummary::from_counts(3, 3, 0, 10, 0);
        s.header_dates = 2;
        let health = scrape_health(&HealthDiag::from_summary(&s, None, &[]));
        assert_eq!(health.score, 75);
        assert_eq!(health.grade, HealthGrade::Warn);
    }

    #[test]
    fn signal_counts_service_days() {
        let mut s = SlotSummary::from_counts(2, 1, 0, 0, 0);
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        s.by_date.insert(d(1), DateCounts::new(1, 0, 0));
        s.by_date.insert(d(2), DateCounts::new(0, 1, 0));
        s.by_date.insert(d(3), DateCounts::new(0, 0, 0));
        let (strength, detail) = signal_strength(&s, &ScoreParams::default());
        assert!(strength > 0.0);
        assert_eq!(detail.signal_service_days, 2);
        assert!(!detail.all_dash);
    }

    #[test]
    fn all_dash_has_no_signal() {
        let s = SlotSummary::from_counts(0, 0, 0, 80, 0);
        let (strength, detail) = signal_strength(&s, &ScoreParams::default());
        assert_eq!(strength, 0.0);
        assert!(detail.all_dash);
    }
}
