//! Long-run ("big data") popularity over the service-date series.
//!
//! The current model weights each service date by lead time and scales the
//! smoothed fill by how much slot volume backs it. The legacy model
//! (moving average of instant scores times an observation-day trust) is
//! still computed so the two can be compared side by side.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::instant::{clamp01, saturate, score_v2};
use super::series::{collect_service_series, lead_days, ServiceDay};
use crate::calendar::SlotSummary;
use crate::config::ScoreParams;
use crate::store::HistoryEntry;

/// Service dates considered by the decayed score.
pub const BD_MAX_WINDOW: usize = 112;
const MA_WINDOWS: [usize; 6] = [3, 14, 28, 56, 84, 112];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovingAverages {
    pub ma3: Option<f64>,
    pub ma14: Option<f64>,
    pub ma28: Option<f64>,
    pub ma56: Option<f64>,
    pub ma84: Option<f64>,
    pub ma112: Option<f64>,
}

impl MovingAverages {
    fn from_fn(mut f: impl FnMut(usize) -> Option<f64>) -> Self {
        let [ma3, ma14, ma28, ma56, ma84, ma112] = MA_WINDOWS.map(&mut f);
        Self {
            ma3,
            ma14,
            ma28,
            ma56,
            ma84,
            ma112,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LongRunDetail {
    pub big_score: f64,
    pub level: f64,
    pub volume_factor: f64,
    pub total_weighted: f64,
    pub total_sat: f64,
    pub half_life: f64,
    pub window: Option<usize>,
    pub service_days: usize,
    pub obs_days: usize,
    pub moving_averages: MovingAverages,
    pub unique_dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyDetail {
    pub big_score: f64,
    pub level: f64,
    pub trust: f64,
    pub window: Option<usize>,
    pub service_days: usize,
    pub obs_days: usize,
    pub moving_averages: MovingAverages,
}

struct Entry {
    total: f64,
    fill: f64,
    weight: f64,
}

fn window_stats(entries: &[Entry], window: usize) -> Option<(f64, f64)> {
    let subset = &entries[..window.min(entries.len())];
    if subset.is_empty() {
        return None;
    }
    let wsum: f64 = subset.iter().map(|e| e.weight).sum();
    let fill_sum: f64 = subset.iter().map(|e| e.fill * e.weight).sum();
    let volume: f64 = subset.iter().map(|e| e.total * e.weight).sum();
    let fill_avg = if wsum > 0.0 { fill_sum / wsum } else { 0.0 };
    Some((fill_avg, volume))
}

/// Decayed long-run score in `[0, 1]`. With no usable history the current
/// counts are scored alone with weight 1.
pub fn long_run_score(
    current: &SlotSummary,
    history: &[HistoryEntry],
    today: NaiveDate,
    params: &ScoreParams,
) -> LongRunDetail {
    let series = collect_service_series(current, history, today, params.bd_input_min_confidence, false);
    let days: &[ServiceDay] = &series.days[..series.days.len().min(BD_MAX_WINDOW)];

    let max_lead = days
        .iter()
        .map(|s| lead_days(s.service_date, today))
        .max()
        .unwrap_or(0);
    let prior_bell = params.bd_prior_bell;
    let prior_open = params.bd_prior_open;

    let mut entries: Vec<Entry> = days
        .iter()
        .filter(|s| s.total() > 0)
        .map(|s| {
            let total = f64::from(s.total());
            let age = (max_lead - lead_days(s.service_date, today)).max(0) as f64;
            Entry {
                total,
                fill: (f64::from(s.bell) + prior_bell) / (total + prior_bell + prior_open),
                weight: (-age / params.bd_half_life).exp(),
            }
        })
        .collect();

    if entries.is_empty() {
        let total = f64::from(current.bell + current.maru + current.tel);
        let fill = if total > 0.0 {
            (f64::from(current.bell) + prior_bell) / (total + prior_bell + prior_open)
        } else {
            0.0
        };
        entries.push(Entry {
            total,
            fill,
            weight: 1.0,
        });
    }

    let (level, total_weighted) = window_stats(&entries, entries.len()).unwrap_or((0.0, 0.0));
    let volume_factor = saturate(total_weighted, params.bd_total_sat, 1.0);
    let service_days = days.len();

    LongRunDetail {
        big_score: clamp01(level * volume_factor),
        level,
        volume_factor,
        total_weighted,
        total_sat: params.bd_total_sat,
        half_life: params.bd_half_life,
        window: (service_days > 0).then_some(service_days.min(BD_MAX_WINDOW)),
        service_days,
        obs_days: series.obs_dates.len(),
        moving_averages: MovingAverages::from_fn(|w| window_stats(&entries, w).map(|(fill, _)| fill)),
        unique_dates: days.iter().map(|s| s.service_date).collect(),
    }
}

/// Previous long-run model, kept for comparison.
pub fn legacy_long_run_score(
    current: &SlotSummary,
    history: &[HistoryEntry],
    today: NaiveDate,
    params: &ScoreParams,
) -> LegacyDetail {
    let series = collect_service_series(current, history, today, params.bd_input_min_confidence, false);
    let mut scores: Vec<f64> = series
        .days
        .iter()
        .map(|s| score_v2(s.bell, s.maru, s.tel, params.bell_sat))
        .collect();
    if scores.is_empty() {
        scores.push(score_v2(current.bell, current.maru, current.tel, params.bell_sat));
    }

    let ma = |window: usize| {
        let subset = &scores[..window.max(1).min(scores.len())];
        Some(subset.iter().sum::<f64>() / subset.len() as f64)
    };

    let service_days = if series.days.is_empty() {
        scores.len()
    } else {
        series.days.len()
    };
    let window = MA_WINDOWS.iter().rev().copied().find(|w| service_days >= *w);
    let level = match window {
        Some(w) => ma(w).unwrap_or(0.0),
        None => scores[0],
    };
    let obs_days = series.obs_dates.len();
    let trust = saturate(obs_days as f64, params.trust_day_sat, 1.0);

    LegacyDetail {
        big_score: clamp01(level * trust),
        level,
        trust,
        window,
        service_days,
        obs_days,
        moving_averages: MovingAverages::from_fn(ma),
    }
}
