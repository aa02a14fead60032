//! End-to-end drift scenario
//!
//! A tool emits 15 readings at 1 Hz with temperature ramping 182.0 -> 189.0,
//! pressure held constant and vibration falling in lockstep. Health
//! assessments before the breach must show a shrinking RUL attributed to
//! vibration; the interlock must fire once the temperature passes 188.0.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use fab_sentinel::config::SentinelConfig;
use fab_sentinel::safety::{FileSafetyLog, MemorySafetyLog};
use fab_sentinel::storage::{
    self, InMemoryQuarantineStore, InMemoryTelemetryStore, QuarantineStore, SledQuarantineStore,
    SledTelemetryStore,
};
use fab_sentinel::types::{Action, AuditOutcome, Metric, Reading, RootCause};
use fab_sentinel::{IngestOutcome, ToolHealthPipeline};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn ramp_reading(i: i64) -> Reading {
    let mut metrics = BTreeMap::new();
    metrics.insert(Metric::Temperature, 182.0 + i as f64 * 0.5);
    metrics.insert(Metric::Pressure, 10.0);
    metrics.insert(Metric::Vibration, 3.5 - i as f64 * 0.1);
    Reading {
        timestamp: t0() + Duration::seconds(i),
        tool_id: "ETCH-001".to_string(),
        wafer_id: format!("WFR-{:04}", i + 1),
        metrics,
        status: "NOMINAL".to_string(),
        location: "Greenfield-Line1".to_string(),
    }
}

fn run_ramp(pipeline: &ToolHealthPipeline) -> Vec<IngestOutcome> {
    (0..15)
        .map(|i| {
            let reading = ramp_reading(i);
            pipeline.ingest_at(&reading, reading.timestamp)
        })
        .collect()
}

#[test]
fn test_drift_ramp_in_memory() {
    let quarantine = Arc::new(InMemoryQuarantineStore::new());
    let safety_log = Arc::new(MemorySafetyLog::new());
    let pipeline = ToolHealthPipeline::new(
        Arc::new(InMemoryTelemetryStore::new()),
        quarantine.clone(),
        safety_log.clone(),
        &SentinelConfig::default(),
    );

    let outcomes = run_ramp(&pipeline);

    // Interlock: strictly above 188.0 only (readings 13 and 14)
    let active: Vec<usize> = outcomes
        .iter()
        .enumerate()
        .filter(|(_, o)| o.interlock.active)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(active, vec![13, 14]);
    assert!(outcomes[13..]
        .iter()
        .all(|o| matches!(o.interlock.audit, AuditOutcome::Created(_))));

    // Too little history for a forecast in the first nine readings
    for outcome in &outcomes[..9] {
        let verdict = outcome.health.as_ref().unwrap();
        assert!(!verdict.is_drifting);
        assert_eq!(verdict.root_cause, RootCause::Normal);
    }

    let ruls: Vec<f64> = outcomes[9..]
        .iter()
        .map(|o| o.health.as_ref().unwrap().remaining_life_seconds.unwrap())
        .collect();
    assert_eq!(ruls, vec![3.0, 2.0, 1.0, 0.0, 0.0, 0.0]);
    assert!(ruls.windows(2).all(|w| w[1] <= w[0]));

    for outcome in &outcomes[9..13] {
        let verdict = outcome.health.as_ref().unwrap();
        assert!(verdict.is_drifting);
        assert_eq!(verdict.root_cause, RootCause::SystemInstability);
        assert_eq!(verdict.reason, "CONTRIBUTING_FACTOR: VIBRATION (INVERSE)");
        assert_eq!(verdict.contributors.len(), 1);
        assert_eq!(verdict.contributors[0].metric, Metric::Vibration);
        assert_eq!(verdict.contributors[0].correlation, -1.0);
        assert_eq!(verdict.recommended_action, Action::EmergencyStop);
    }

    let records = quarantine.list_quarantine().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].wafer_id, "WFR-0015");
    assert_eq!(records[1].wafer_id, "WFR-0014");
    assert_eq!(safety_log.len(), 2);

    let stats = pipeline.stats();
    assert_eq!(stats.readings_processed, 15);
    assert_eq!(stats.interlocks_fired, 2);
    assert_eq!(stats.health_failures, 0);
}

#[test]
fn test_drift_ramp_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");
    let db = storage::open_db(dir.path().join("data")).unwrap();
    let quarantine = Arc::new(SledQuarantineStore::new(Arc::clone(&db)).unwrap());
    let pipeline = ToolHealthPipeline::new(
        Arc::new(SledTelemetryStore::new(Arc::clone(&db)).unwrap()),
        quarantine.clone(),
        Arc::new(FileSafetyLog::open(&log_dir).unwrap()),
        &SentinelConfig::default(),
    );

    let outcomes = run_ramp(&pipeline);
    assert_eq!(
        outcomes[11].health.as_ref().unwrap().remaining_life_seconds,
        Some(1.0)
    );

    // Re-sending the breaching wafer does not duplicate its record
    let repeat = ramp_reading(14);
    let again = pipeline.ingest_at(&repeat, repeat.timestamp);
    assert!(again.interlock.active);
    assert!(matches!(again.interlock.audit, AuditOutcome::AlreadyQuarantined(_)));
    assert_eq!(quarantine.list_quarantine().unwrap().len(), 2);

    let mut lines = Vec::new();
    for entry in std::fs::read_dir(&log_dir).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("safety_shutdowns_") && name.ends_with(".log"));
        let contents = std::fs::read_to_string(&path).unwrap();
        lines.extend(contents.lines().map(str::to_string));
    }
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|l| l.contains("[CRITICAL] SHUTDOWN TRIGGERED | Tool: ETCH-001")));
    assert!(lines[0].ends_with("Wafer: WFR-0014 | Metric: temperature | Value: 188.50 > Limit: 188.0"));

    assert_eq!(pipeline.reset_quarantine().unwrap(), 2);
    assert!(quarantine.list_quarantine().unwrap().is_empty());
}
