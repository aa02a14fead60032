//! Adaptive baseline: exponentially weighted moving average over a metric history.

/// EMA of a chronological series, seeded with the first value, rounded to
/// 2 decimals.
///
/// `ema + α·(value − ema)` is the same recurrence as `α·value + (1−α)·ema`
/// but leaves a constant series exactly unchanged.
///
/// Returns 0.0 for an empty series; callers must not read that as a real
/// baseline.
pub fn adaptive_baseline(values: &[f64], alpha: f64) -> f64 {
    let Some((&first, rest)) = values.split_first() else {
        return 0.0;
    };
    let ema = rest
        .iter()
        .fold(first, |ema, &value| ema + alpha * (value - ema));
    (ema * 100.0).round() / 100.0
}
