//! Analysis outputs: SpcChart, RootCause, Action, RootCauseVerdict, HealthVerdict

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Metric;

// ============================================================================
// SPC
// ============================================================================

/// Control limits computed over one batch.
///
/// `ucl >= mean >= lcl` always holds: σ is never negative and is zero
/// when fewer than two observations are available.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlLimits {
    pub mean: f64,
    pub std_dev: f64,
    pub ucl: f64,
    pub lcl: f64,
}

impl ControlLimits {
    /// A point violates when it lies strictly outside [LCL, UCL].
    pub fn is_violation(&self, value: f64) -> bool {
        value > self.ucl || value < self.lcl
    }
}

/// One control-chart point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpcPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub is_violation: bool,
}

/// Control-chart dataset for a batch of observations.
///
/// An empty batch yields `limits == None` and no points; "no data" is
/// distinct from "in control".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpcChart {
    pub limits: Option<ControlLimits>,
    pub points: Vec<SpcPoint>,
}

impl SpcChart {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn violation_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_violation).count()
    }
}

// ============================================================================
// Root cause & countermeasures
// ============================================================================

/// Attributed cause of a drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RootCause {
    Normal,
    ThermalRunaway,
    /// Reserved for sensor-level diagnostics; not produced by the correlation analyzer.
    SensoryDrift,
    SystemInstability,
}

impl fmt::Display for RootCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootCause::Normal => write!(f, "NORMAL"),
            RootCause::ThermalRunaway => write!(f, "THERMAL_RUNAWAY"),
            RootCause::SensoryDrift => write!(f, "SENSORY_DRIFT"),
            RootCause::SystemInstability => write!(f, "SYSTEM_INSTABILITY"),
        }
    }
}

/// Direction of a correlation between two metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Impact {
    Direct,
    Inverse,
}

impl Impact {
    pub fn from_correlation(r: f64) -> Self {
        if r > 0.0 {
            Impact::Direct
        } else {
            Impact::Inverse
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Impact::Direct => write!(f, "DIRECT"),
            Impact::Inverse => write!(f, "INVERSE"),
        }
    }
}

/// A comparison metric whose correlation with the drifting metric passed the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricCorrelation {
    pub metric: Metric,
    /// Pearson r, rounded to 2 decimals
    pub correlation: f64,
    pub impact: Impact,
}

/// Root-cause attribution with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCauseVerdict {
    pub cause: RootCause,
    pub reason: String,
    /// Correlated metrics, strongest first
    #[serde(default)]
    pub contributors: Vec<MetricCorrelation>,
}

impl RootCauseVerdict {
    pub fn new(cause: RootCause, reason: impl Into<String>) -> Self {
        Self {
            cause,
            reason: reason.into(),
            contributors: Vec::new(),
        }
    }
}

/// Recommended operator / automation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Monitor,
    /// Valid vocabulary value; the current policy never emits it.
    ReducePower,
    IncreaseCoolant,
    EmergencyStop,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Monitor => write!(f, "MONITOR"),
            Action::ReducePower => write!(f, "REDUCE_POWER"),
            Action::IncreaseCoolant => write!(f, "INCREASE_COOLANT"),
            Action::EmergencyStop => write!(f, "EMERGENCY_STOP"),
        }
    }
}

// ============================================================================
// Health verdict
// ============================================================================

/// Health assessment for one incoming reading. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthVerdict {
    /// Seconds until the failure threshold is reached (`None` = no prediction)
    pub remaining_life_seconds: Option<f64>,
    pub is_drifting: bool,
    pub root_cause: RootCause,
    pub reason: String,
    pub recommended_action: Action,
    /// Current value minus adaptive baseline (only when drifting)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributors: Vec<MetricCorrelation>,
}

impl HealthVerdict {
    /// The STABLE state: no trend worth forecasting.
    pub fn stable() -> Self {
        Self {
            remaining_life_seconds: None,
            is_drifting: false,
            root_cause: RootCause::Normal,
            reason: "Stable".to_string(),
            recommended_action: Action::Monitor,
            severity: None,
            contributors: Vec::new(),
        }
    }

    /// The DRIFTING state, sub-classified by the root-cause verdict.
    pub fn drifting(rul_seconds: f64, severity: f64, verdict: RootCauseVerdict, action: Action) -> Self {
        Self {
            remaining_life_seconds: Some(rul_seconds),
            is_drifting: true,
            root_cause: verdict.cause,
            reason: verdict.reason,
            recommended_action: action,
            severity: Some(severity),
            contributors: verdict.contributors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&RootCause::SystemInstability).unwrap(),
            "\"SYSTEM_INSTABILITY\""
        );
        assert_eq!(serde_json::to_string(&Action::EmergencyStop).unwrap(), "\"EMERGENCY_STOP\"");
        assert_eq!(Action::ReducePower.to_string(), "REDUCE_POWER");
    }

    #[test]
    fn test_stable_verdict_shape() {
        let v = HealthVerdict::stable();
        assert!(!v.is_drifting);
        assert_eq!(v.remaining_life_seconds, None);
        assert_eq!(v.root_cause, RootCause::Normal);
        assert_eq!(v.reason, "Stable");
        assert_eq!(v.recommended_action, Action::Monitor);
    }

    #[test]
    fn test_control_limit_boundaries_are_in_control() {
        let limits = ControlLimits { mean: 10.0, std_dev: 1.0, ucl: 13.0, lcl: 7.0 };
        assert!(!limits.is_violation(13.0));
        assert!(!limits.is_violation(7.0));
        assert!(limits.is_violation(13.0001));
        assert!(limits.is_violation(6.9999));
    }
}
