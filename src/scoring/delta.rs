use crate::calendar::SlotSummary;

/// Change in popularity since the previous run, in `[-1, 1]`. Positive
/// when slots are filling (more bell, fewer open). `None` without a
/// previous run.
pub fn delta_popularity(prev: Option<&SlotSummary>, cur: &SlotSummary) -> Option<f64> {
    let prev = prev?;
    let prev_open = i64::from(prev.maru) + i64::from(prev.tel);
    let cur_open = i64::from(cur.maru) + i64::from(cur.tel);
    let raw = (i64::from(cur.bell) - i64::from(prev.bell)) - (cur_open - prev_open);
    let denom = i64::from(cur.total).max(1);
    Some((raw as f64 / denom as f64).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filling_slots_is_positive() {
        let prev = SlotSummary::from_counts(2, 3, 0, 0, 0);
        let mut cur = SlotSummary::from_counts(5, 1, 0, 0, 0);
        cur.total = 20;
        assert_eq!(delta_popularity(Some(&prev), &cur), Some(0.25));
    }

    #[test]
    fn opening_slots_is_negative_and_clamped() {
        let prev = SlotSummary::from_counts(10, 0, 0, 0, 0);
        let cur = SlotSummary::from_counts(0, 10, 0, 0, 0);
        assert_eq!(delta_popularity(Some(&prev), &cur), Some(-1.0));
    }

    #[test]
    fn no_previous_run() {
        assert_eq!(delta_popularity(None, &SlotSummary::from_counts(1, 1, 0, 0, 0)), None);
    }

    #[test]
    fn zero_total_uses_unit_denominator() {
        let prev = SlotSummary::default();
        let cur = SlotSummary::default();
        assert_eq!(delta_popularity(Some(&prev), &cur), Some(0.0));
    }
}
