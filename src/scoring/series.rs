use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use crate::calendar::{DateCounts, SlotSummary};
use crate::store::HistoryEntry;

/// Best known counts for one service date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDay {
    pub service_date: NaiveDate,
    pub obs_date: Option<NaiveDate>,
    pub bell: u32,
    pub maru: u32,
    pub tel: u32,
}

impl ServiceDay {
    pub fn total(&self) -> u32 {
        self.bell + self.maru + self.tel
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceSeries {
    /// Newest service date first
    pub days: Vec<ServiceDay>,
    /// Distinct observation days, today included
    pub obs_dates: BTreeSet<NaiveDate>,
}

struct SeriesBuilder {
    best: BTreeMap<NaiveDate, ServiceDay>,
    include_zero: bool,
}

impl SeriesBuilder {
    /// Keeps one observation per service date: never one made after the
    /// date itself, otherwise the most recent.
    fn offer(&mut self, service_date: NaiveDate, obs_date: Option<NaiveDate>, counts: DateCounts) {
        if obs_date.is_some_and(|obs| obs > service_date) {
            return;
        }
        if counts.bookable() == 0 && !self.include_zero {
            return;
        }
        let candidate = ServiceDay {
            service_date,
            obs_date,
            bell: counts.bell,
            maru: counts.maru,
            tel: counts.tel,
        };
        match self.best.get_mut(&service_date) {
            None => {
                self.best.insert(service_date, candidate);
            }
            Some(prev) => {
                let newer = match (prev.obs_date, obs_date) {
                    (None, Some(_)) => true,
                    (Some(prev_obs), Some(obs)) => obs > prev_obs,
                    _ => false,
                };
                if newer {
                    *prev = candidate;
                }
            }
        }
    }
}

fn summary_counts(s: &SlotSummary) -> DateCounts {
    DateCounts::new(s.bell, s.maru, s.tel)
}

/// Deduplicated service-date series from the current scrape and history.
///
/// The current scrape is observed `today`; when it has no per-date counts
/// it stands for `today` as a whole. History entries below `min_conf`
/// scrape health are ignored when `min_conf > 0`.
pub fn collect_service_series(
    current: &SlotSummary,
    history: &[HistoryEntry],
    today: NaiveDate,
    min_conf: i64,
    include_zero: bool,
) -> ServiceSeries {
    let mut builder = SeriesBuilder {
        best: BTreeMap::new(),
        include_zero,
    };
    let mut obs_dates = BTreeSet::from([today]);

    for (date, counts) in &current.by_date {
        builder.offer(*date, Some(today), *counts);
    }
    if builder.best.is_empty() {
        builder.offer(today, Some(today), summary_counts(current));
    }

    for entry in history {
        if min_conf > 0 && i64::from(entry.site_confidence) < min_conf {
            continue;
        }
        let obs_date = entry.obs_date();
        if let Some(obs) = obs_date {
            obs_dates.insert(obs);
        }
        if !entry.stats.by_date.is_empty() {
            for (date, counts) in &entry.stats.by_date {
                builder.offer(*date, obs_date, *counts);
            }
        } else if let Some(obs) = obs_date {
            builder.offer(obs, Some(obs), summary_counts(&entry.stats));
        }
    }

    ServiceSeries {
        days: builder.best.into_values().rev().collect(),
        obs_dates,
    }
}

/// `(service_date - today)` in days.
pub fn lead_days(service_date: NaiveDate, today: NaiveDate) -> i64 {
    (service_date - today).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, month, day).unwrap()
    }

    fn past(ts: &str, by_date: &[(NaiveDate, DateCounts)]) -> HistoryEntry {
        let mut stats = SlotSummary::from_counts(0, 0, 0, 0, 0);
        stats.by_date = by_date.iter().copied().collect();
        HistoryEntry {
            ts: ts.into(),
            stats,
            site_confidence: 100,
            ..HistoryEntry::default()
        }
    }

    #[test]
    fn current_without_dates_stands_for_today() {
        let today = d(10, 19);
        let series = collect_service_series(&SlotSummary::from_counts(3, 1, 0, 0, 0), &[], today, 0, false);
        assert_eq!(series.days.len(), 1);
        assert_eq!(series.days[0].service_date, today);
        assert_eq!(series.days[0].bell, 3);
        assert_eq!(series.obs_dates.len(), 1);
    }

    #[test]
    fn observations_after_the_service_date_are_ignored() {
        let today = d(10, 19);
        let history = vec![
            // seen on the 16th for the 15th: comes from the future of that day
            past("20261016_090000", &[(d(10, 15), DateCounts::new(9, 0, 0))]),
            past("20261014_090000", &[(d(10, 15), DateCounts::new(1, 4, 0))]),
        ];
        let series = collect_service_series(&SlotSummary::default(), &history, today, 0, false);
        let day = series.days.iter().find(|s| s.service_date == d(10, 15)).unwrap();
        assert_eq!(day.bell, 1);
        assert_eq!(series.obs_dates.len(), 3);
    }

    #[test]
    fn most_recent_valid_observation_wins_and_order_is_newest_first() {
        let today = d(10, 19);
        let mut current = SlotSummary::from_counts(2, 2, 0, 0, 0);
        current.by_date.insert(d(10, 20), DateCounts::new(2, 2, 0));
        let history = vec![
            past("20261018_090000", &[(d(10, 20), DateCounts::new(1, 3, 0)), (d(10, 18), DateCounts::new(4, 0, 0))]),
            past("20261010_090000", &[(d(10, 18), DateCounts::new(0, 4, 0))]),
        ];
        let series = collect_service_series(&current, &history, today, 0, false);
        let dates: Vec<_> = series.days.iter().map(|s| s.service_date).collect();
        assert_eq!(dates, vec![d(10, 20), d(10, 18)]);
        assert_eq!(series.days[0].bell, 2);
        assert_eq!(series.days[1].bell, 4);
    }

    #[test]
    fn zero_days_only_when_requested() {
        let today = d(10, 19);
        let history = vec![past("20261012_090000", &[(d(10, 12), DateCounts::default())])];
        let without = collect_service_series(&SlotSummary::default(), &history, today, 0, false);
        assert!(without.days.is_empty());
        let with = collect_service_series(&SlotSummary::default(), &history, today, 0, true);
        assert_eq!(with.days.len(), 2);
    }

    #[test]
    fn low_confidence_history_is_filtered() {
        let today = d(10, 19);
        let mut weak = past("20261012_090000", &[(d(10, 12), DateCounts::new(3, 0, 0))]);
        weak.site_confidence = 40;
        let series = collect_service_series(&SlotSummary::default(), &[weak], today, 60, false);
        assert!(series.days.is_empty());
        assert_eq!(series.obs_dates.len(), 1);
    }
}
