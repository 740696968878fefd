/// Position of `value` among the sorted distinct `values`, scaled to
/// `[0, 1]`. Ties share a percentile; a single distinct value maps to 0.
/// `None` when `value` is not in `values`.
pub fn percentile_of(value: f64, values: &[f64]) -> Option<f64> {
    let unique = sorted_unique(values);
    match unique.len() {
        0 => None,
        1 => (unique[0] == value).then_some(0.0),
        n => unique
            .iter()
            .position(|v| *v == value)
            .map(|idx| idx as f64 / (n - 1) as f64),
    }
}

/// Percentile of every score in the batch, in input order.
pub fn assign_percentiles(scores: &[f64]) -> Vec<f64> {
    let unique = sorted_unique(scores);
    let denom = unique.len().saturating_sub(1);
    scores
        .iter()
        .map(|score| {
            if denom == 0 {
                return 0.0;
            }
            let idx = unique.partition_point(|v| v < score);
            idx as f64 / denom as f64
        })
        .collect()
}

fn sorted_unique(values: &[f64]) -> Vec<f64> {
    let mut unique: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    unique.sort_by(f64::total_cmp);
    unique.dedup();
    unique
}
