use super::model::SlotSummary;

pub const MIN_TIME_ROWS: u32 = 20;
pub const MAX_TIME_ROWS: u32 = 60;
pub const MIN_COLS: u32 = 5;
pub const MAX_COLS: u32 = 8;
const TD_MIN_RATIO: f64 = 0.30;
const TD_MAX_RATIO: f64 = 2.50;

pub const ALL_DASH_MIN_SLOTS: u32 = 40;
const ALL_DASH_RATIO: f64 = 0.95;

/// Why a full evaluation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanityIssue {
    StatsNg,
    TimeRowsRange,
    MaxColsRange,
    TotalSlotsMismatch,
    TdCountMissing,
    TdCountTooSmall,
    TdCountTooLarge,
}

impl SanityIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            SanityIssue::StatsNg => "stats_ng",
            SanityIssue::TimeRowsRange => "time_rows_range",
            SanityIssue::MaxColsRange => "max_cols_range",
            SanityIssue::TotalSlotsMismatch => "total_slots_mismatch",
            SanityIssue::TdCountMissing => "td_count_missing",
            SanityIssue::TdCountTooSmall => "td_count_too_small",
            SanityIssue::TdCountTooLarge => "td_count_too_large",
        }
    }
}

/// Structural bounds a settled calendar must satisfy.
pub fn check_calendar(s: &SlotSummary) -> Result<(), SanityIssue> {
    if !s.ok {
        return Err(SanityIssue::StatsNg);
    }
    if !(MIN_TIME_ROWS..=MAX_TIME_ROWS).contains(&s.time_rows) {
        return Err(SanityIssue::TimeRowsRange);
    }
    if !(MIN_COLS..=MAX_COLS).contains(&s.max_cols) {
        return Err(SanityIssue::MaxColsRange);
    }
    let expected = s.expected_slots();
    if expected == 0 || s.total + s.excluded != expected {
        return Err(SanityIssue::TotalSlotsMismatch);
    }
    if s.td_count == 0 {
        return Err(SanityIssue::TdCountMissing);
    }
    let td_min = 3u32.max((expected as f64 * TD_MIN_RATIO) as u32);
    let td_max = (expected as f64 * TD_MAX_RATIO) as u32;
    if s.td_count < td_min {
        return Err(SanityIssue::TdCountTooSmall);
    }
    if s.td_count > td_max {
        return Err(SanityIssue::TdCountTooLarge);
    }
    Ok(())
}

/// A large grid with nothing bookable and (almost) only dashes: a real
/// "closed" calendar rather than a half-rendered one.
pub fn looks_all_dash(s: &SlotSummary) -> bool {
    if s.total < ALL_DASH_MIN_SLOTS || s.bell + s.maru + s.tel != 0 {
        return false;
    }
    s.dash as f64 / s.total as f64 >= ALL_DASH_RATIO
}
