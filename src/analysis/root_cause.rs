//! Root-Cause Correlation Analysis
//!
//! Cross-correlates the drifting metric against every other concurrently
//! sampled metric of the same tool:
//! - no partner with |r| above the threshold: the drift is intrinsic to the
//!   target subsystem (`THERMAL_RUNAWAY`)
//! - otherwise the strongest partner is reported as a contributing factor of
//!   a systemic fault (`SYSTEM_INSTABILITY`)
//!
//! Series are aligned by sample index on their trailing samples. When
//! metrics are sampled at different rates this alignment is approximate.

use std::collections::BTreeMap;

use crate::config::defaults;
use crate::types::{Impact, Metric, MetricCorrelation, RootCause, RootCauseVerdict};

pub const REASON_NO_CORRELATIONS: &str = "No correlations found";

/// Pearson correlation coefficient.
///
/// `None` when the inputs differ in length, have fewer than two points, or
/// either side has zero variance (r undefined).
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    // Rounding in the mean can leave a constant series with a tiny nonzero variance
    if is_constant(x) || is_constant(y) {
        return None;
    }

    let n = x.len() as f64;
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - x_mean;
        let dy = b - y_mean;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }

    let r = (cov / denominator).clamp(-1.0, 1.0);
    r.is_finite().then_some(r)
}

fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

/// Attribute the drift of `target` using the per-metric value history.
pub fn identify_root_cause(
    target: Metric,
    telemetry: &BTreeMap<Metric, Vec<f64>>,
    correlation_threshold: f64,
) -> RootCauseVerdict {
    let target_values = match telemetry.get(&target) {
        Some(values) if !values.is_empty() => values,
        _ => return RootCauseVerdict::new(RootCause::Normal, REASON_NO_CORRELATIONS),
    };

    let has_partner = telemetry
        .iter()
        .any(|(metric, values)| *metric != target && !values.is_empty());
    if !has_partner {
        return RootCauseVerdict::new(RootCause::Normal, REASON_NO_CORRELATIONS);
    }

    let mut contributors: Vec<(MetricCorrelation, f64)> = Vec::new();
    for (&metric, values) in telemetry {
        if metric == target {
            continue;
        }

        let n = target_values.len().min(values.len());
        let x = &target_values[target_values.len() - n..];
        let y = &values[values.len() - n..];

        let Some(r) = pearson(x, y) else {
            continue;
        };

        if r.abs() > correlation_threshold {
            contributors.push((
                MetricCorrelation {
                    metric,
                    correlation: (r * 100.0).round() / 100.0,
                    impact: Impact::from_correlation(r),
                },
                r,
            ));
        }
    }

    // Stable sort: equal |r| keeps first-encountered order
    contributors.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let contributors: Vec<MetricCorrelation> = contributors.into_iter().map(|(c, _)| c).collect();

    match contributors.first() {
        None => RootCauseVerdict::new(
            RootCause::ThermalRunaway,
            format!("{}_PRIMARY_FAILURE", target.code()),
        ),
        Some(top) => {
            let reason = format!("CONTRIBUTING_FACTOR: {} ({})", top.metric.code(), top.impact);
            RootCauseVerdict {
                cause: RootCause::SystemInstability,
                reason,
                contributors,
            }
        }
    }
}

/// [`identify_root_cause`] with the default 0.7 threshold.
pub fn identify_root_cause_default(
    target: Metric,
    telemetry: &BTreeMap<Metric, Vec<f64>>,
) -> RootCauseVerdict {
    identify_root_cause(target, telemetry, defaults::CORRELATION_THRESHOLD)
}
