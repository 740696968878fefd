use anyhow::Result;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::{ItemResult, RunSettings};
use crate::calendar::ScrapeReason;
use crate::config::RankSortMode;
use crate::scoring::{assign_percentiles, score_item, ScoreCard, ScoreInputs};
use crate::store::{
    append_history, load_history, load_snapshot, save_snapshot, write_json_atomic, DataDirs,
    HistoryEntry, StateSnapshot, TS_FORMAT,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// One row of `results.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedItem {
    #[serde(flatten)]
    pub result: ItemResult,
    pub scores: ScoreCard,
    /// Left out of percentiles and ordering
    pub excluded: bool,
    pub rank_percentile: Option<f64>,
    pub rank_percentile_lower: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub ts: String,
    pub rank_sort_mode: RankSortMode,
    pub items: Vec<RankedItem>,
}

impl RunReport {
    pub fn ranked(&self) -> impl Iterator<Item = &RankedItem> {
        self.items.iter().filter(|i| !i.excluded)
    }
}

fn sort_key(item: &RankedItem, mode: RankSortMode) -> f64 {
    match mode {
        RankSortMode::Raw => item.scores.rank_score_raw,
        RankSortMode::Lower => item.scores.rank_score_lower,
    }
}

/// Scores every result against its stored history, ranks the batch and
/// persists history, snapshots and `runs/{run_id}/results.json`.
///
/// Per-item store failures are logged and skipped; only the results file
/// is fatal.
pub fn finalize_run(
    dirs: &DataDirs,
    settings: &RunSettings,
    results: Vec<ItemResult>,
) -> Result<RunReport> {
    let config = &settings.config;
    let ts = Local::now().format(TS_FORMAT).to_string();

    let mut items: Vec<RankedItem> = results
        .into_iter()
        .map(|result| {
            let id = result.job.id.clone();
            let history = load_history(&dirs.history_path(&id), config.retention.max_lines)
                .unwrap_or_else(|err| {
                    log_warn!("history load failed item={} err={:#}", id, err);
                    Vec::new()
                });
            let previous = load_snapshot(&dirs.state_path(&id)).unwrap_or_else(|err| {
                log_warn!("snapshot load failed item={} err={:#}", id, err);
                None
            });

            let scores = score_item(
                &ScoreInputs {
                    current: &result.summary,
                    frame_url: result.frame_url.as_deref(),
                    history: &history,
                    previous: previous.as_ref().map(|s| &s.stats),
                    today: settings.today,
                },
                &config.score,
                &config.rank,
            );
            let excluded = !result.summary.ok
                && ScrapeReason::excludes_from_ranking(result.summary.reason_str());
            if excluded {
                log_info!("excluded from ranking item={} reason={}", id, result.summary.reason_str());
            }

            RankedItem {
                result,
                scores,
                excluded,
                rank_percentile: None,
                rank_percentile_lower: None,
            }
        })
        .collect();

    assign_batch_percentiles(&mut items);

    let mode = config.rank.rank_sort_mode;
    items.sort_by(|a, b| match (a.excluded, b.excluded) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => sort_key(b, mode).total_cmp(&sort_key(a, mode)),
    });

    for item in items.iter().filter(|i| i.result.summary.ok) {
        persist_item(dirs, &settings.run_id, &ts, item);
    }

    let report = RunReport {
        run_id: settings.run_id.clone(),
        ts,
        rank_sort_mode: mode,
        items,
    };
    write_json_atomic(&dirs.run_dir(&settings.run_id).join("results.json"), &report)?;
    log_info!(
        "run finalized run_id={} items={} ranked={} sort={}",
        report.run_id,
        report.items.len(),
        report.ranked().count(),
        mode.as_str()
    );
    Ok(report)
}

fn assign_batch_percentiles(items: &mut [RankedItem]) {
    let included: Vec<usize> = (0..items.len()).filter(|&i| !items[i].excluded).collect();
    let raw: Vec<f64> = included.iter().map(|&i| items[i].scores.rank_score_raw).collect();
    let lower: Vec<f64> = included.iter().map(|&i| items[i].scores.rank_score_lower).collect();
    let raw_pct = assign_percentiles(&raw);
    let lower_pct = assign_percentiles(&lower);
    for (n, &i) in included.iter().enumerate() {
        items[i].rank_percentile = Some(raw_pct[n]);
        items[i].rank_percentile_lower = Some(lower_pct[n]);
    }
}

fn persist_item(dirs: &DataDirs, run_id: &str, ts: &str, item: &RankedItem) {
    let job = &item.result.job;
    let entry = HistoryEntry {
        ts: ts.to_string(),
        run_id: run_id.to_string(),
        item_id: job.id.clone(),
        name: job.name.clone(),
        group: job.group.clone(),
        stats: item.result.summary.clone(),
        frame_url: item.result.frame_url.clone(),
        site_confidence: item.scores.health.score,
        scores: item.scores.clone(),
    };
    if let Err(err) = append_history(&dirs.history_path(&job.id), &entry) {
        log_warn!("history append failed item={} err={:#}", job.id, err);
    }

    let snapshot = StateSnapshot {
        ts: ts.to_string(),
        run_id: run_id.to_string(),
        item_id: job.id.clone(),
        name: job.name.clone(),
        stats: item.result.summary.clone(),
        score: item.scores.score,
        big_score: item.scores.big_score,
        rank_score_raw: item.scores.rank_score_raw,
    };
    if let Err(err) = save_snapshot(&dirs.state_path(&job.id), &snapshot) {
        log_warn!("snapshot save failed item={} err={:#}", job.id, err);
    }
}
