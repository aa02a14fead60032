//! Statistical Process Control
//!
//! Shewhart individuals chart: UCL/LCL at mean ± 3σ over the whole batch,
//! with σ the sample standard deviation (Bessel's correction) from statrs.

use statrs::statistics::Statistics;

use crate::types::{ControlLimits, MetricSample, SpcChart, SpcPoint};

/// Control limits are placed this many standard deviations from the mean.
pub const SIGMA_MULTIPLIER: f64 = 3.0;

/// Compute mean, sample σ and 3σ limits for a batch.
///
/// Returns `None` for an empty batch. A single observation has σ = 0.
pub fn control_limits(values: &[f64]) -> Option<ControlLimits> {
    if values.is_empty() {
        return None;
    }

    let mean = values.iter().mean();
    let std_dev = if values.len() < 2 {
        0.0
    } else {
        values.iter().std_dev()
    };

    Some(ControlLimits {
        mean,
        std_dev,
        ucl: mean + SIGMA_MULTIPLIER * std_dev,
        lcl: mean - SIGMA_MULTIPLIER * std_dev,
    })
}

/// Build a control-chart dataset, flagging each point outside [LCL, UCL].
pub fn evaluate(samples: &[MetricSample]) -> SpcChart {
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let Some(limits) = control_limits(&values) else {
        return SpcChart::default();
    };

    let points = samples
        .iter()
        .map(|s| SpcPoint {
            timestamp: s.timestamp,
            value: s.value,
            is_violation: limits.is_violation(s.value),
        })
        .collect();

    SpcChart {
        limits: Some(limits),
        points,
    }
}
