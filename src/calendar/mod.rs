//! Calendar grid extraction: cell classification, header dates, span
//! expansion and the structural checks a settled grid must pass.

pub mod classify;
pub mod dates;
pub mod grid;
pub mod health;
pub mod model;
pub mod sanity;

pub use grid::{extract_summary, has_calendar_table, light_signature, LIGHT_PROBE_SCRIPT};
pub use health::{scrape_health, signal_strength, HealthDiag, HealthGrade, ScrapeHealth, SignalDetail};
pub use model::{
    DateCounts, LightSignature, ScrapeReason, SlotKind, SlotSummary, StabilitySignature,
    StabilizeDetail,
};
pub use sanity::{check_calendar, looks_all_dash, SanityIssue};
