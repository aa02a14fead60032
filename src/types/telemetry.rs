//! Telemetry types: Metric, Reading, MetricSample, HistoryRecord, HistoryQuery

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Metric vocabulary
// ============================================================================

/// Sensor channels a fab tool reports.
///
/// Closed set: readings carrying any other key are rejected at
/// deserialization, and history records with unknown labels are skipped
/// before they reach the analysis code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Chamber temperature (°C). The primary thermal metric.
    Temperature,
    /// Chamber pressure (mTorr)
    Pressure,
    /// Chuck vibration (mm/s RMS)
    Vibration,
    /// Process gas flow (sccm)
    GasFlow,
}

impl Metric {
    /// Every metric, in declaration order.
    pub const ALL: [Metric; 4] = [
        Metric::Temperature,
        Metric::Pressure,
        Metric::Vibration,
        Metric::GasFlow,
    ];

    /// The metric checked by the hard interlock and forecast by RUL.
    pub const PRIMARY: Metric = Metric::Temperature;

    /// Storage / wire label (`"temperature"`, `"gas_flow"`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Pressure => "pressure",
            Metric::Vibration => "vibration",
            Metric::GasFlow => "gas_flow",
        }
    }

    /// Upper-case label used in root-cause reason strings.
    pub fn code(&self) -> &'static str {
        match self {
            Metric::Temperature => "TEMPERATURE",
            Metric::Pressure => "PRESSURE",
            Metric::Vibration => "VIBRATION",
            Metric::GasFlow => "GAS_FLOW",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a metric label is outside the known vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric: {0}")]
pub struct UnknownMetric(pub String);

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" => Ok(Metric::Temperature),
            "pressure" => Ok(Metric::Pressure),
            "vibration" => Ok(Metric::Vibration),
            "gas_flow" | "gasflow" => Ok(Metric::GasFlow),
            other => Err(UnknownMetric(other.to_string())),
        }
    }
}

// ============================================================================
// Readings
// ============================================================================

/// One telemetry reading emitted by a tool for a single wafer cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Sample time (always UTC; offsets on the wire are normalized)
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Tool identifier, e.g. `ETCH-001`
    pub tool_id: String,
    /// Wafer / lot identifier, e.g. `WFR-0001`
    pub wafer_id: String,
    /// Metric values; optional metrics may be absent
    pub metrics: BTreeMap<Metric, f64>,
    /// Tool-reported status label (`NOMINAL`, `CRITICAL_OVERHEAT`, ...)
    pub status: String,
    /// Line / bay label
    pub location: String,
}

impl Reading {
    /// Value of one metric, if the tool reported it.
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }

    /// Primary thermal value; absent temperature reads as 0.0.
    pub fn primary_value(&self) -> f64 {
        self.metric(Metric::PRIMARY).unwrap_or(0.0)
    }
}

/// Accept RFC 3339 timestamps, and naive ISO-8601 timestamps as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
}

/// A single (timestamp, value) point of one metric series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl MetricSample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Flattened history row as returned by the time-series store.
///
/// `metric` stays a raw label: the store may hold fields the analysis
/// vocabulary does not know about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub metric: String,
    pub value: f64,
    pub tool_id: String,
    pub wafer_id: String,
}

impl HistoryRecord {
    /// Flatten a reading into one record per reported metric.
    pub fn from_reading(reading: &Reading) -> Vec<HistoryRecord> {
        reading
            .metrics
            .iter()
            .map(|(metric, value)| HistoryRecord {
                timestamp: reading.timestamp,
                metric: metric.as_str().to_string(),
                value: *value,
                tool_id: reading.tool_id.clone(),
                wafer_id: reading.wafer_id.clone(),
            })
            .collect()
    }
}

/// Filter for `TelemetryStore::recent_readings`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryQuery {
    /// Restrict to one tool
    pub tool_id: Option<String>,
    /// Restrict to one metric
    pub metric: Option<Metric>,
    /// Most recent N readings (each reading yields one record per metric)
    pub limit: usize,
    /// Ignore readings older than this instant
    pub since: Option<DateTime<Utc>>,
}

impl HistoryQuery {
    pub fn for_tool(tool_id: impl Into<String>, limit: usize) -> Self {
        Self {
            tool_id: Some(tool_id.into()),
            limit,
            ..Default::default()
        }
    }

    pub fn metric(mut self, metric: Metric) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_labels_round_trip_through_from_str() {
        for metric in Metric::ALL {
            assert_eq!(metric.as_str().parse::<Metric>().unwrap(), metric);
        }
        assert!("humidity".parse::<Metric>().is_err());
    }

    #[test]
    fn test_reading_rejects_unknown_metric_keys() {
        let json = r#"{
            "timestamp": "2024-01-01T00:00:00Z",
            "tool_id": "ETCH-001",
            "wafer_id": "WFR-0001",
            "metrics": {"temperature": 181.2, "humidity": 40.0},
            "status": "NOMINAL",
            "location": "Greenfield-Line1"
        }"#;
        assert!(serde_json::from_str::<Reading>(json).is_err());
    }

    #[test]
    fn test_reading_tolerates_missing_optional_metrics() {
        let json = r#"{
            "timestamp": "2024-01-01T02:00:00+02:00",
            "tool_id": "ETCH-001",
            "wafer_id": "WFR-0001",
            "metrics": {"pressure": 10.1},
            "status": "NOMINAL",
            "location": "Greenfield-Line1"
        }"#;
        let reading: Reading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.metric(Metric::Temperature), None);
        assert_eq!(reading.primary_value(), 0.0);
        assert_eq!(reading.timestamp.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_naive_timestamp_is_assigned_utc() {
        let json = r#"{
            "timestamp": "2024-01-01T08:30:00.250000",
            "tool_id": "ETCH-001",
            "wafer_id": "WFR-0002",
            "metrics": {"temperature": 180.4},
            "status": "NOMINAL",
            "location": "Greenfield-Line1"
        }"#;
        let reading: Reading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.timestamp.to_rfc3339(), "2024-01-01T08:30:00.250+00:00");
    }

    #[test]
    fn test_from_reading_flattens_each_metric() {
        let mut metrics = BTreeMap::new();
        metrics.insert(Metric::Temperature, 181.0);
        metrics.insert(Metric::GasFlow, 52.0);
        let reading = Reading {
            timestamp: Utc::now(),
            tool_id: "ETCH-001".into(),
            wafer_id: "WFR-0007".into(),
            metrics,
            status: "NOMINAL".into(),
            location: "Greenfield-Line1".into(),
        };

        let records = HistoryRecord::from_reading(&reading);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metric, "temperature");
        assert_eq!(records[1].metric, "gas_flow");
        assert!(records.iter().all(|r| r.wafer_id == "WFR-0007"));
    }
}
