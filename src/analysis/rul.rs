//! Remaining Useful Life prediction
//!
//! First-order extrapolation: least-squares line through the recent window
//! (value against elapsed seconds), projected forward to the failure
//! threshold. The guards reject sparse, stale and flat windows before any
//! fitting happens; they are "no prediction" outcomes, not errors.

use chrono::{DateTime, Utc};

use crate::config::{defaults, SentinelConfig};
use crate::types::MetricSample;

/// Tuning for [`predict_remaining_life`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RulParams {
    /// Value at which the tool is considered failed
    pub failure_threshold: f64,
    /// Fewer observations than this yield no prediction
    pub min_samples: usize,
    /// Latest sample must be at most this old (seconds)
    pub freshness_secs: f64,
    /// Slopes at or below this (units/second) are not concerning
    pub concerning_slope: f64,
}

impl Default for RulParams {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::RUL_FAILURE_THRESHOLD,
            min_samples: defaults::RUL_MIN_SAMPLES,
            freshness_secs: defaults::RUL_FRESHNESS_SECS,
            concerning_slope: defaults::RUL_CONCERNING_SLOPE,
        }
    }
}

impl RulParams {
    pub fn from_config(config: &SentinelConfig) -> Self {
        Self {
            failure_threshold: config.rul.failure_threshold,
            min_samples: config.rul.min_samples,
            freshness_secs: config.rul.freshness_secs,
            concerning_slope: config.rul.concerning_slope,
        }
    }
}

/// Least-squares line `value = slope · t + intercept`, t in seconds since the first sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trend {
    pub slope: f64,
    pub intercept: f64,
}

/// Fit a simple linear regression over a chronological series.
///
/// `None` when there are fewer than two points or all share one timestamp.
pub fn fit_trend(series: &[MetricSample]) -> Option<Trend> {
    let first = series.first()?;
    if series.len() < 2 {
        return None;
    }

    let xs: Vec<f64> = series
        .iter()
        .map(|s| (s.timestamp - first.timestamp).num_milliseconds() as f64 / 1_000.0)
        .collect();

    let n = series.len() as f64;
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = series.iter().map(|s| s.value).sum::<f64>() / n;

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    for (x, s) in xs.iter().zip(series) {
        let dx = x - x_mean;
        ss_xy += dx * (s.value - y_mean);
        ss_xx += dx * dx;
    }

    if ss_xx.abs() < f64::EPSILON {
        return None;
    }

    let slope = ss_xy / ss_xx;
    Some(Trend {
        slope,
        intercept: y_mean - slope * x_mean,
    })
}

/// Forecast seconds until the latest value reaches `failure_threshold`.
///
/// Guards, in order: too few samples, stale latest sample (relative to
/// `now`), zero variance. A flat or falling trend also yields `None`.
/// The result is never negative and is rounded to 2 decimals; 0.0 means
/// the threshold is already met.
pub fn predict_remaining_life(
    series: &[MetricSample],
    params: &RulParams,
    now: DateTime<Utc>,
) -> Option<f64> {
    if series.len() < params.min_samples {
        return None;
    }
    let latest = series.last()?;

    let age_secs = (now - latest.timestamp).num_milliseconds() as f64 / 1_000.0;
    if age_secs > params.freshness_secs {
        tracing::trace!(age_secs, "RUL skipped: tool not actively monitored");
        return None;
    }

    let first_value = series[0].value;
    if series.iter().all(|s| s.value == first_value) {
        return None;
    }

    let trend = fit_trend(series)?;
    if trend.slope <= params.concerning_slope {
        return None;
    }

    if latest.value >= params.failure_threshold {
        return Some(0.0);
    }

    let remaining = (params.failure_threshold - latest.value) / trend.slope;
    Some(round2(remaining.max(0.0)))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
