//! Countermeasure policy: (severity, RUL) -> recommended action.

use crate::config::{defaults, SentinelConfig};
use crate::types::Action;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountermeasureParams {
    /// A RUL below this many seconds demands an emergency stop
    pub emergency_rul_secs: f64,
    /// Deviation above this calls for more coolant
    pub coolant_severity: f64,
}

impl Default for CountermeasureParams {
    fn default() -> Self {
        Self {
            emergency_rul_secs: defaults::EMERGENCY_RUL_SECS,
            coolant_severity: defaults::COOLANT_SEVERITY,
        }
    }
}

impl CountermeasureParams {
    pub fn from_config(config: &SentinelConfig) -> Self {
        Self {
            emergency_rul_secs: config.countermeasure.emergency_rul_secs,
            coolant_severity: config.countermeasure.coolant_severity,
        }
    }
}

/// Pick an action. An imminent RUL overrides severity.
///
/// `REDUCE_POWER` is never produced here.
pub fn recommend(severity: f64, rul_seconds: Option<f64>, params: &CountermeasureParams) -> Action {
    if rul_seconds.is_some_and(|rul| rul < params.emergency_rul_secs) {
        return Action::EmergencyStop;
    }
    if severity > params.coolant_severity {
        return Action::IncreaseCoolant;
    }
    Action::Monitor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imminent_failure_overrides_severity() {
        let p = CountermeasureParams::default();
        assert_eq!(recommend(0.0, Some(10.0), &p), Action::EmergencyStop);
        assert_eq!(recommend(50.0, Some(10.0), &p), Action::EmergencyStop);
        assert_eq!(recommend(-3.0, Some(0.0), &p), Action::EmergencyStop);
    }

    #[test]
    fn test_severity_ladder_without_rul() {
        let p = CountermeasureParams::default();
        assert_eq!(recommend(6.0, None, &p), Action::IncreaseCoolant);
        assert_eq!(recommend(1.0, None, &p), Action::Monitor);
        assert_eq!(recommend(5.0, None, &p), Action::Monitor);
    }

    #[test]
    fn test_distant_rul_falls_through_to_severity() {
        let p = CountermeasureParams::default();
        assert_eq!(recommend(6.0, Some(30.0), &p), Action::IncreaseCoolant);
        assert_eq!(recommend(1.0, Some(120.0), &p), Action::Monitor);
    }
}
