//! One scraping run: bounded concurrent scraping of every item, then
//! scoring, ranking and persistence.

pub mod controller;
pub mod error;
pub mod finalize;
pub mod limiter;
pub mod pool;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::calendar::SlotSummary;
use crate::config::AppConfig;
use crate::store::TS_FORMAT;
use crate::suspicious::DiagnosticsSink;

pub use controller::{execute_run, RunController};
pub use error::RunError;
pub use finalize::{finalize_run, RankedItem, RunReport};
pub use limiter::NavLimiter;
pub use pool::scrape_items;

/// One item to scrape, as listed in `items.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemJob {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub reservation_url: String,
    #[serde(default)]
    pub detail_url: Option<String>,
    #[serde(default)]
    pub group: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemTiming {
    pub goto_s: f64,
    pub count_s: f64,
    pub total_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub job: ItemJob,
    pub summary: SlotSummary,
    pub frame_url: Option<String>,
    pub timing: ItemTiming,
}

/// Everything a worker needs, shared read-only across the pool.
pub struct RunSettings {
    pub run_id: String,
    pub config: AppConfig,
    pub today: NaiveDate,
    pub limiter: NavLimiter,
    pub diagnostics: Option<DiagnosticsSink>,
    /// Presence of this file stops the run before the next item
    pub stop_flag: Option<PathBuf>,
}

impl RunSettings {
    pub fn new(run_id: String, config: AppConfig, today: NaiveDate) -> Self {
        let limiter = NavLimiter::new(config.auto.min_nav_interval_ms);
        Self {
            run_id,
            config,
            today,
            limiter,
            diagnostics: None,
            stop_flag: None,
        }
    }

    pub fn with_diagnostics(mut self, sink: DiagnosticsSink) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn with_stop_flag(mut self, path: PathBuf) -> Self {
        self.stop_flag = Some(path);
        self
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_flag.as_ref().is_some_and(|p| p.exists())
    }
}

/// `YYYYMMDD_HHMMSS_xxxxxxxx`: local time plus a short random suffix.
pub fn new_run_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Local::now().format(TS_FORMAT), &suffix[..8])
}
