//! Health Orchestrator
//!
//! Composes the adaptive baseline, RUL predictor, root-cause analyzer and
//! countermeasure policy into one [`HealthVerdict`] per incoming reading.
//!
//! Two states, entered fresh on every call:
//! - STABLE: no RUL forecast for the primary metric
//! - DRIFTING: RUL forecast present, sub-classified by root cause

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use super::baseline::adaptive_baseline;
use super::countermeasure::{recommend, CountermeasureParams};
use super::root_cause::identify_root_cause;
use super::rul::{predict_remaining_life, RulParams};
use crate::config::{defaults, SentinelConfig};
use crate::types::{HealthVerdict, HistoryRecord, Metric, MetricSample, Reading};

/// Per-metric history of one tool, chronological.
pub type TelemetryMap = BTreeMap<Metric, Vec<MetricSample>>;

/// All tunables used by a health assessment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisParams {
    pub rul: RulParams,
    pub baseline_alpha: f64,
    pub correlation_threshold: f64,
    pub countermeasures: CountermeasureParams,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            rul: RulParams::default(),
            baseline_alpha: defaults::BASELINE_ALPHA,
            correlation_threshold: defaults::CORRELATION_THRESHOLD,
            countermeasures: CountermeasureParams::default(),
        }
    }
}

impl AnalysisParams {
    pub fn from_config(config: &SentinelConfig) -> Self {
        Self {
            rul: RulParams::from_config(config),
            baseline_alpha: config.baseline.alpha,
            correlation_threshold: config.root_cause.correlation_threshold,
            countermeasures: CountermeasureParams::from_config(config),
        }
    }

    /// Parameters from the process-wide config (defaults before `config::init`).
    pub fn current() -> Self {
        Self::from_config(crate::config::get())
    }
}

/// Group raw history rows of `tool_id` by metric in a single pass.
///
/// Rows of other tools and rows with unrecognized metric labels are skipped.
pub fn build_telemetry_map(tool_id: &str, history: &[HistoryRecord]) -> TelemetryMap {
    let mut map = TelemetryMap::new();
    for record in history {
        if record.tool_id != tool_id {
            continue;
        }
        match record.metric.parse::<Metric>() {
            Ok(metric) => map
                .entry(metric)
                .or_default()
                .push(MetricSample::new(record.timestamp, record.value)),
            Err(e) => trace!(error = %e, "Skipping history row"),
        }
    }
    map
}

/// Assess a reading against its tool's recent history, as of now.
pub fn assess_health(reading: &Reading, history: &[HistoryRecord], params: &AnalysisParams) -> HealthVerdict {
    assess_health_at(reading, history, params, Utc::now())
}

/// Assess a reading as of `now` (used by the freshness guard).
pub fn assess_health_at(
    reading: &Reading,
    history: &[HistoryRecord],
    params: &AnalysisParams,
    now: DateTime<Utc>,
) -> HealthVerdict {
    let current = reading.primary_value();
    let telemetry = build_telemetry_map(&reading.tool_id, history);
    let primary: &[MetricSample] = telemetry
        .get(&Metric::PRIMARY)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let Some(rul) = predict_remaining_life(primary, &params.rul, now) else {
        debug!(tool_id = %reading.tool_id, samples = primary.len(), "Tool stable");
        return HealthVerdict::stable();
    };

    let primary_values: Vec<f64> = primary.iter().map(|s| s.value).collect();
    let baseline = adaptive_baseline(&primary_values, params.baseline_alpha);
    let severity = current - baseline;

    let values: BTreeMap<Metric, Vec<f64>> = telemetry
        .iter()
        .map(|(metric, series)| (*metric, series.iter().map(|s| s.value).collect()))
        .collect();
    let verdict = identify_root_cause(Metric::PRIMARY, &values, params.correlation_threshold);
    let action = recommend(severity, Some(rul), &params.countermeasures);

    debug!(
        tool_id = %reading.tool_id,
        wafer_id = %reading.wafer_id,
        rul_seconds = rul,
        baseline,
        severity,
        root_cause = %verdict.cause,
        action = %action,
        "Tool drifting"
    );

    HealthVerdict::drifting(rul, severity, verdict, action)
}
