//! Tool health pipeline service
//!
//! One logical flow per reading: interlock, persist, fetch history, assess.
//! The interlock runs first and its decision survives any later failure.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analysis::{assess_health_at, spc, AnalysisParams};
use crate::config::SentinelConfig;
use crate::safety::{InterlockController, SafetyLogSink};
use crate::storage::{QuarantineStore, StorageError, TelemetryStore};
use crate::types::{
    HealthVerdict, HistoryQuery, InterlockDecision, Metric, MetricSample, QuarantineRecord, Reading, SpcChart,
};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to record reading: {0}")]
    Append(#[source] StorageError),
    #[error("history unavailable: {0}")]
    History(#[source] StorageError),
    #[error("quarantine store error: {0}")]
    Quarantine(#[source] StorageError),
}

/// Result of ingesting one reading.
///
/// `interlock` is always present; `health` carries the assessment or the
/// reason it could not be produced.
#[derive(Debug)]
pub struct IngestOutcome {
    pub interlock: InterlockDecision,
    pub health: Result<HealthVerdict, PipelineError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub readings_processed: u64,
    pub health_failures: u64,
    pub interlocks_fired: u64,
    pub audit_failures: u64,
    pub safety_log_failures: u64,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline: {} readings, {} interlocks ({} audit failures, {} safety-log failures), {} health failures",
            self.readings_processed,
            self.interlocks_fired,
            self.audit_failures,
            self.safety_log_failures,
            self.health_failures
        )
    }
}

pub struct ToolHealthPipeline {
    telemetry: Arc<dyn TelemetryStore>,
    quarantine: Arc<dyn QuarantineStore>,
    interlock: InterlockController,
    params: AnalysisParams,
    history_window: usize,
    /// `None` when the configured lookback does not fit a duration: no horizon
    lookback: Option<Duration>,
    readings_processed: AtomicU64,
    health_failures: AtomicU64,
}

impl ToolHealthPipeline {
    pub fn new(
        telemetry: Arc<dyn TelemetryStore>,
        quarantine: Arc<dyn QuarantineStore>,
        safety_log: Arc<dyn SafetyLogSink>,
        config: &SentinelConfig,
    ) -> Self {
        info!(
            telemetry = telemetry.backend_name(),
            quarantine = quarantine.backend_name(),
            safety_log = %safety_log.describe(),
            threshold = config.interlock.threshold,
            "Tool health pipeline ready"
        );
        Self {
            interlock: InterlockController::new(Arc::clone(&quarantine), safety_log, config.interlock.threshold),
            telemetry,
            quarantine,
            params: AnalysisParams::from_config(config),
            history_window: config.history.window,
            lookback: Duration::try_seconds(config.history.lookback_secs),
            readings_processed: AtomicU64::new(0),
            health_failures: AtomicU64::new(0),
        }
    }

    /// Hard interlock only; never fails.
    pub fn evaluate_interlock(&self, reading: &Reading) -> InterlockDecision {
        self.interlock.evaluate(reading)
    }

    /// Full per-reading flow, as of now.
    pub fn ingest(&self, reading: &Reading) -> IngestOutcome {
        self.ingest_at(reading, Utc::now())
    }

    /// Full per-reading flow with an explicit clock for the freshness guard
    /// and the history lookback.
    pub fn ingest_at(&self, reading: &Reading, now: DateTime<Utc>) -> IngestOutcome {
        self.readings_processed.fetch_add(1, Ordering::Relaxed);

        let interlock = self.interlock.evaluate(reading);
        let health = self
            .telemetry
            .append_reading(reading)
            .map_err(PipelineError::Append)
            .and_then(|()| self.assess_reading(reading, now));

        match &health {
            Ok(verdict) => debug!(
                tool_id = %reading.tool_id,
                wafer_id = %reading.wafer_id,
                interlock = interlock.active,
                drifting = verdict.is_drifting,
                "Reading processed"
            ),
            Err(e) => {
                self.health_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    tool_id = %reading.tool_id,
                    wafer_id = %reading.wafer_id,
                    interlock = interlock.active,
                    error = %e,
                    "Health assessment unavailable"
                );
            }
        }

        IngestOutcome { interlock, health }
    }

    /// Assess the latest stored reading of a tool. `None` if the tool has no readings.
    pub fn assess_tool(&self, tool_id: &str) -> Result<Option<HealthVerdict>, PipelineError> {
        self.assess_tool_at(tool_id, Utc::now())
    }

    pub fn assess_tool_at(&self, tool_id: &str, now: DateTime<Utc>) -> Result<Option<HealthVerdict>, PipelineError> {
        let Some(latest) = self.telemetry.latest_reading(tool_id).map_err(PipelineError::History)? else {
            return Ok(None);
        };
        self.assess_reading(&latest, now).map(Some)
    }

    fn assess_reading(&self, reading: &Reading, now: DateTime<Utc>) -> Result<HealthVerdict, PipelineError> {
        let mut query = HistoryQuery::for_tool(&reading.tool_id, self.history_window);
        if let Some(since) = self.lookback.and_then(|lookback| now.checked_sub_signed(lookback)) {
            query = query.since(since);
        }
        let history = self
            .telemetry
            .recent_readings(&query)
            .map_err(PipelineError::History)?;
        Ok(assess_health_at(reading, &history, &self.params, now))
    }

    /// Control chart over the recent window of one metric.
    pub fn spc_chart(&self, tool_id: &str, metric: Metric) -> Result<SpcChart, PipelineError> {
        let query = HistoryQuery::for_tool(tool_id, self.history_window).metric(metric);
        let samples: Vec<MetricSample> = self
            .telemetry
            .recent_readings(&query)
            .map_err(PipelineError::History)?
            .into_iter()
            .map(|record| MetricSample::new(record.timestamp, record.value))
            .collect();
        Ok(spc::evaluate(&samples))
    }

    pub fn history(&self, query: &HistoryQuery) -> Result<Vec<crate::types::HistoryRecord>, PipelineError> {
        self.telemetry.recent_readings(query).map_err(PipelineError::History)
    }

    pub fn latest_reading(&self, tool_id: &str) -> Result<Option<Reading>, PipelineError> {
        self.telemetry.latest_reading(tool_id).map_err(PipelineError::History)
    }

    pub fn quarantine_records(&self) -> Result<Vec<QuarantineRecord>, PipelineError> {
        self.quarantine.list_quarantine().map_err(PipelineError::Quarantine)
    }

    /// Operator reset: clear all quarantine records.
    pub fn reset_quarantine(&self) -> Result<usize, PipelineError> {
        let cleared = self.interlock.reset().map_err(PipelineError::Quarantine)?;
        info!(cleared, "Quarantine cleared by operator reset");
        Ok(cleared)
    }

    pub fn interlock_threshold(&self) -> f64 {
        self.interlock.threshold()
    }

    pub fn stats(&self) -> PipelineStats {
        let interlock = self.interlock.counters();
        PipelineStats {
            readings_processed: self.readings_processed.load(Ordering::Relaxed),
            health_failures: self.health_failures.load(Ordering::Relaxed),
            interlocks_fired: interlock.activations,
            audit_failures: interlock.audit_failures,
            safety_log_failures: interlock.safety_log_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::MemorySafetyLog;
    use crate::storage::{InMemoryQuarantineStore, InMemoryTelemetryStore};
    use crate::types::AuditOutcome;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    struct Fixture {
        telemetry: Arc<InMemoryTelemetryStore>,
        quarantine: Arc<InMemoryQuarantineStore>,
        log: Arc<MemorySafetyLog>,
        pipeline: ToolHealthPipeline,
    }

    fn fixture() -> Fixture {
        let telemetry = Arc::new(InMemoryTelemetryStore::new());
        let quarantine = Arc::new(InMemoryQuarantineStore::new());
        let log = Arc::new(MemorySafetyLog::new());
        let pipeline = ToolHealthPipeline::new(
            telemetry.clone(),
            quarantine.clone(),
            log.clone(),
            &SentinelConfig::default(),
        );
        Fixture {
            telemetry,
            quarantine,
            log,
            pipeline,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn reading(i: i64, temperature: f64) -> Reading {
        let mut metrics = BTreeMap::new();
        metrics.insert(Metric::Temperature, temperature);
        metrics.insert(Metric::Pressure, 10.0);
        Reading {
            timestamp: t0() + Duration::seconds(i),
            tool_id: "ETCH-001".to_string(),
            wafer_id: format!("WFR-{:04}", i + 1),
            metrics,
            status: "NOMINAL".to_string(),
            location: "Greenfield-Line1".to_string(),
        }
    }

    #[test]
    fn test_ingest_nominal_reading() {
        let f = fixture();
        let outcome = f.pipeline.ingest_at(&reading(0, 181.0), t0());
        assert!(!outcome.interlock.active);
        assert_eq!(outcome.health.unwrap(), HealthVerdict::stable());
        assert_eq!(f.pipeline.stats().readings_processed, 1);
        assert!(f.log.is_empty());
    }

    #[test]
    fn test_interlock_survives_history_outage() {
        let f = fixture();
        f.telemetry.set_unavailable(true);

        let outcome = f.pipeline.ingest_at(&reading(0, 190.0), t0());

        assert!(outcome.interlock.active);
        assert!(matches!(outcome.interlock.audit, AuditOutcome::Created(_)));
        assert!(matches!(outcome.health, Err(PipelineError::Append(_))));
        assert_eq!(f.log.len(), 1);
        let stats = f.pipeline.stats();
        assert_eq!(stats.health_failures, 1);
        assert_eq!(stats.interlocks_fired, 1);
    }

    #[test]
    fn test_assess_tool_uses_latest_reading() {
        let f = fixture();
        assert_eq!(f.pipeline.assess_tool("ETCH-001").unwrap(), None);

        for i in 0..12 {
            f.pipeline.ingest_at(&reading(i, 182.0 + i as f64 * 0.5), t0() + Duration::seconds(i));
        }
        let verdict = f
            .pipeline
            .assess_tool_at("ETCH-001", t0() + Duration::seconds(12))
            .unwrap()
            .unwrap();
        assert!(verdict.is_drifting);
        assert_eq!(verdict.remaining_life_seconds, Some(1.0));
    }

    #[test]
    fn test_extreme_lookback_means_no_horizon() {
        let mut config = SentinelConfig::default();
        config.history.lookback_secs = i64::MAX;
        let pipeline = ToolHealthPipeline::new(
            Arc::new(InMemoryTelemetryStore::new()),
            Arc::new(InMemoryQuarantineStore::new()),
            Arc::new(MemorySafetyLog::new()),
            &config,
        );

        for i in 0..12 {
            pipeline.ingest_at(&reading(i, 182.0 + i as f64 * 0.5), t0() + Duration::seconds(i));
        }
        let verdict = pipeline
            .assess_tool_at("ETCH-001", t0() + Duration::seconds(12))
            .unwrap()
            .unwrap();
        assert_eq!(verdict.remaining_life_seconds, Some(1.0));
    }

    #[test]
    fn test_spc_chart_over_stored_readings() {
        let f = fixture();
        assert!(f.pipeline.spc_chart("ETCH-001", Metric::Temperature).unwrap().is_empty());

        for i in 0..20 {
            f.pipeline.ingest_at(&reading(i, 180.0 + (i % 2) as f64 * 0.2), t0() + Duration::seconds(i));
        }
        f.pipeline.ingest_at(&reading(20, 186.0), t0() + Duration::seconds(20));

        let chart = f.pipeline.spc_chart("ETCH-001", Metric::Temperature).unwrap();
        assert_eq!(chart.points.len(), 21);
        assert!(chart.limits.is_some());
        assert_eq!(chart.violation_count(), 1);
        assert!(chart.points.last().unwrap().is_violation);
    }

    #[test]
    fn test_reset_quarantine() {
        let f = fixture();
        f.pipeline.ingest_at(&reading(0, 189.0), t0());
        assert_eq!(f.pipeline.quarantine_records().unwrap().len(), 1);

        assert_eq!(f.pipeline.reset_quarantine().unwrap(), 1);
        assert!(f.quarantine.list_quarantine().unwrap().is_empty());
        assert_eq!(f.log.len(), 2);
    }
}
