//! Popularity scores computed from one scrape plus the item's history.
//! Everything here is pure: no I/O, no clock (callers pass `today`).

pub mod delta;
pub mod instant;
pub mod longrun;
pub mod percentile;
pub mod rank;
pub mod series;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::{scrape_health, signal_strength, HealthDiag, ScrapeHealth, SignalDetail, SlotSummary};
use crate::config::params::{LONG_RUN_MODEL_NAME, RANK_MODEL_NAME, SCORE_MODEL_NAME};
use crate::config::{RankParams, ScoreParams};
use crate::store::HistoryEntry;

pub use delta::delta_popularity;
pub use instant::{clamp01, score_v2, wilson_lower_bound};
pub use longrun::{legacy_long_run_score, long_run_score, LegacyDetail, LongRunDetail};
pub use percentile::{assign_percentiles, percentile_of};
pub use rank::{rank_score, RankDetail};
pub use series::{collect_service_series, ServiceDay, ServiceSeries};

/// Every score computed for one item in one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreCard {
    pub score: f64,
    pub big_score: f64,
    pub big_score_old: f64,
    pub rank_score_raw: f64,
    pub rank_score_lower: f64,
    pub delta: Option<f64>,
    pub health: ScrapeHealth,
    pub signal_strength: f64,
    pub signal: SignalDetail,
    pub long_run: LongRunDetail,
    pub legacy: LegacyDetail,
    pub rank: RankDetail,
    pub score_model: String,
    pub bd_model: String,
    pub rank_model: String,
}

/// Inputs of [`score_item`]. `history` is newest first.
pub struct ScoreInputs<'a> {
    pub current: &'a SlotSummary,
    pub frame_url: Option<&'a str>,
    pub history: &'a [HistoryEntry],
    pub previous: Option<&'a SlotSummary>,
    pub today: NaiveDate,
}

pub fn score_item(inputs: &ScoreInputs<'_>, score: &ScoreParams, rank: &RankParams) -> ScoreCard {
    let current = inputs.current;
    let long_run = long_run_score(current, inputs.history, inputs.today, score);
    let legacy = legacy_long_run_score(current, inputs.history, inputs.today, score);
    let rank_detail = rank_score(current, inputs.history, inputs.today, rank);
    let health = scrape_health(&HealthDiag::from_summary(current, inputs.frame_url, &[]));
    let (signal_strength, signal) = signal_strength(current, score);

    ScoreCard {
        score: score_v2(current.bell, current.maru, current.tel, score.bell_sat),
        big_score: long_run.big_score,
        big_score_old: legacy.big_score,
        rank_score_raw: rank_detail.rank_score_raw,
        rank_score_lower: rank_detail.rank_score_lower,
        delta: delta_popularity(inputs.previous, current),
        health,
        signal_strength,
        signal,
        long_run,
        legacy,
        rank: rank_detail,
        score_model: SCORE_MODEL_NAME.to_string(),
        bd_model: LONG_RUN_MODEL_NAME.to_string(),
        rank_model: RANK_MODEL_NAME.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_card_combines_models() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let mut current = SlotSummary::from_counts(12, 4, 2, 20, 0);
        current.header_dates = 7;
        let previous = SlotSummary::from_counts(10, 6, 2, 20, 0);
        let inputs = ScoreInputs {
            current: &current,
            frame_url: Some("https://yoyaku.cityheaven.net/calendar/1"),
            history: &[],
            previous: Some(&previous),
            today,
        };
        let card = score_item(&inputs, &ScoreParams::default(), &RankParams::default());
        assert!(card.score > 0.0 && card.score <= 1.0);
        assert!(card.rank_score_lower <= card.rank_score_raw);
        assert_eq!(card.delta, Some((2.0 + 2.0) / 38.0));
        assert_eq!(card.health.score, 100);
        assert_eq!(card.bd_model, LONG_RUN_MODEL_NAME);
    }
}
