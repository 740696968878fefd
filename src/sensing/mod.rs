//! Calendar stabilization against a live automation surface.

pub mod controller;
pub mod frames;
pub mod loop_worker;
pub mod reservation;
pub mod surface;

use chrono::NaiveDate;

use crate::calendar::{ScrapeReason, SlotSummary};
use crate::config::StabilizerConfig;
use crate::suspicious::DiagnosticsSink;

pub use controller::count_calendar_slots;
pub use loop_worker::stabilize_calendar;
pub use surface::{navigate, FrameId, FrameInfo, IframeElement, Surface, SurfaceError, SurfaceFactory, Target};

/// Who is being scraped and under which limits.
pub struct ScrapeContext<'a> {
    pub item_id: &'a str,
    pub group: &'a str,
    /// Reference date for resolving header dates
    pub today: NaiveDate,
    pub config: &'a StabilizerConfig,
    pub diagnostics: Option<&'a DiagnosticsSink>,
}

/// Outcome of one stabilization: a summary that is either confirmed
/// (`ok`) or carries its failure reason, plus the calendar frame URL.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarScrape {
    pub summary: SlotSummary,
    pub frame_url: Option<String>,
}

impl CalendarScrape {
    pub fn failed(reason: ScrapeReason, frame_url: Option<String>) -> Self {
        Self {
            summary: SlotSummary::from(reason),
            frame_url,
        }
    }
}
