use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::calendar::SlotSummary;
use crate::scoring::ScoreCard;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Timestamp layout of `ts`, also used for run ids.
pub const TS_FORMAT: &str = "%Y%m%d_%H%M%S";

/// One line of `history/{item}.jsonl`. Written once, never rewritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryEntry {
    pub ts: String,
    pub run_id: String,
    pub item_id: String,
    pub name: String,
    pub group: String,
    pub stats: SlotSummary,
    pub frame_url: Option<String>,
    /// Scrape health score at the time of writing
    pub site_confidence: i32,
    pub scores: ScoreCard,
}

impl HistoryEntry {
    /// Calendar day the entry was observed on, from `ts`.
    pub fn obs_date(&self) -> Option<NaiveDate> {
        parse_obs_date(&self.ts)
    }
}

fn parse_obs_date(ts: &str) -> Option<NaiveDate> {
    let ts = ts.trim();
    if ts.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.date_naive());
    }
    let digits = ts.get(..8)?;
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}

/// Up to `limit` entries, newest first. A missing file is an empty
/// history; unparsable lines are skipped.
pub fn load_history(path: &Path, limit: usize) -> Result<Vec<HistoryEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read history from {}", path.display()))?;

    let mut entries = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(err) => log_debug!("history skip line={} path={} err={}", idx + 1, path.display(), err),
        }
    }

    // file order breaks ties, so reverse first and sort stably
    entries.reverse();
    entries.sort_by(|a, b| b.ts.cmp(&a.ts));
    entries.truncate(limit);
    Ok(entries)
}

/// Appends one JSON line. The whole line goes out in a single write.
pub fn append_history(path: &Path, entry: &HistoryEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open history {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("Failed to append history to {}", path.display()))
}
