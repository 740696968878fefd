use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::instant::{clamp01, saturate, wilson_lower_bound};
use super::series::collect_service_series;
use crate::calendar::SlotSummary;
use crate::config::RankParams;
use crate::store::HistoryEntry;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RankDetail {
    pub quality: f64,
    pub quality_lower_bound: f64,
    pub momentum: f64,
    pub rank_score_raw: f64,
    /// Same as raw with the Wilson bound in place of quality; never above raw
    pub rank_score_lower: f64,
    pub service_days: usize,
    pub obs_days: usize,
    pub weighted_bell: f64,
    pub weighted_quality_sum: f64,
    pub weighted_success: f64,
    pub weighted_total: f64,
}

struct Entry {
    bell: f64,
    fill: f64,
    quality_weight: f64,
    momentum_weight: f64,
}

fn decay(age: f64, half_life: f64) -> f64 {
    if half_life > 0.0 {
        (-age / half_life).exp()
    } else {
        1.0
    }
}

/// Quality (decayed smoothed fill) combined with momentum (decayed bell
/// volume). Days without bookable slots stay in the series at reduced
/// weight so persistent unavailability pulls quality down.
pub fn rank_score(
    current: &SlotSummary,
    history: &[HistoryEntry],
    today: NaiveDate,
    params: &RankParams,
) -> RankDetail {
    let series = collect_service_series(current, history, today, params.rank_input_min_confidence, true);
    let days = &series.days[..series.days.len().min(params.rank_max_window)];
    let prior_bell = params.quality_prior_bell;
    let prior_open = params.quality_prior_open;

    let mut success_wsum = 0.0;
    let mut total_wsum = 0.0;
    let mut entries = Vec::with_capacity(days.len().max(1));

    for (idx, day) in days.iter().enumerate() {
        let age = match day.obs_date {
            Some(obs) => (today - obs).num_days().max(0) as f64,
            None => idx as f64,
        };
        let bell = f64::from(day.bell);
        let total = f64::from(day.total());
        let base_weight = decay(age, params.quality_half_life);

        let (fill, weight, success, effective_total) = if day.total() > 0 {
            (
                (bell + prior_bell) / (total + prior_bell + prior_open),
                base_weight,
                bell + prior_bell,
                total + prior_bell + prior_open,
            )
        } else {
            (0.0, base_weight * params.zero_total_weight, 0.0, 0.0)
        };

        success_wsum += success * weight;
        total_wsum += effective_total * weight;
        entries.push(Entry {
            bell,
            fill,
            quality_weight: weight,
            momentum_weight: decay(age, params.momentum_half_life),
        });
    }

    if entries.is_empty() {
        let bell = f64::from(current.bell);
        let total = f64::from(current.bell + current.maru + current.tel);
        let (fill, success, effective_total) = if total > 0.0 {
            (
                (bell + prior_bell) / (total + prior_bell + prior_open),
                bell + prior_bell,
                total + prior_bell + prior_open,
            )
        } else {
            (0.0, 0.0, 0.0)
        };
        success_wsum += success;
        total_wsum += effective_total;
        entries.push(Entry {
            bell,
            fill,
            quality_weight: 1.0,
            momentum_weight: 1.0,
        });
    }

    let quality_wsum: f64 = entries.iter().map(|e| e.quality_weight).sum();
    let quality = if quality_wsum > 0.0 {
        entries.iter().map(|e| e.fill * e.quality_weight).sum::<f64>() / quality_wsum
    } else {
        0.0
    };
    let quality = clamp01(quality);
    let quality_lower = clamp01(wilson_lower_bound(success_wsum, total_wsum, params.quality_lower_z));

    let weighted_bell: f64 = entries.iter().map(|e| e.bell * e.momentum_weight).sum();
    let momentum = clamp01(saturate(weighted_bell, params.momentum_bell_sat, 0.0));

    let base = params.rank_momentum_base;
    let momentum_term = base + (1.0 - base) * momentum.powf(params.momentum_power);
    let rank_raw = clamp01(quality.powf(params.quality_power) * momentum_term);
    let rank_lower = clamp01(quality_lower.powf(params.quality_power) * momentum_term).min(rank_raw);

    RankDetail {
        quality,
        quality_lower_bound: quality_lower,
        momentum,
        rank_score_raw: rank_raw,
        rank_score_lower: rank_lower,
        service_days: days.len(),
        obs_days: series.obs_dates.len(),
        weighted_bell,
        weighted_quality_sum: quality_wsum,
        weighted_success: success_wsum,
        weighted_total: total_wsum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::DateCounts;
    use proptest::prelude::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn lower_never_exceeds_raw_without_history() {
        let detail = rank_score(&SlotSummary::from_counts(3, 1, 0, 0, 0), &[], today(), &RankParams::default());
        assert!(detail.rank_score_lower <= detail.rank_score_raw);
        assert!(detail.rank_score_raw > 0.0);
    }

    #[test]
    fn empty_input_is_neutral() {
        let detail = rank_score(&SlotSummary::default(), &[], today(), &RankParams::default());
        assert_eq!(detail.quality, 0.0);
        assert_eq!(detail.momentum, 0.0);
        assert_eq!(detail.rank_score_raw, 0.0);
        assert_eq!(detail.rank_score_lower, 0.0);
    }

    #[test]
    fn zero_days_pull_quality_down() {
        let params = RankParams::default();
        let mut busy = SlotSummary::from_counts(8, 0, 0, 0, 0);
        busy.by_date.insert(today(), DateCounts::new(8, 0, 0));
        let alone = rank_score(&busy, &[], today(), &params);

        let mut with_gap = busy.clone();
        with_gap
            .by_date
            .insert(today().succ_opt().unwrap(), DateCounts::default());
        let gapped = rank_score(&with_gap, &[], today(), &params);
        assert!(gapped.quality < alone.quality);
        assert_eq!(gapped.service_days, 2);
    }

    proptest! {
        #[test]
        fn rank_lower_never_exceeds_raw(
            bell in 0u32..80, maru in 0u32..80, tel in 0u32..20,
            past in proptest::collection::vec((1u32..=28, 0u32..40, 0u32..40, 0u32..10), 0..15),
        ) {
            let current = SlotSummary::from_counts(bell, maru, tel, 0, 0);
            let history: Vec<HistoryEntry> = past
                .iter()
                .map(|(day, b, m, t)| {
                    let date = NaiveDate::from_ymd_opt(2026, 9, *day).unwrap();
                    let mut stats = SlotSummary::default();
                    stats.by_date.insert(date, DateCounts::new(*b, *m, *t));
                    HistoryEntry {
                        ts: date.format("%Y%m%d_070000").to_string(),
                        stats,
                        ..HistoryEntry::default()
                    }
                })
                .collect();
            let detail = rank_score(&current, &history, today(), &RankParams::default());
            prop_assert!(detail.rank_score_lower <= detail.rank_score_raw);
            prop_assert!((0.0..=1.0).contains(&detail.rank_score_raw));
        }
    }
}
