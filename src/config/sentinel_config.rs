//! Sentinel configuration loaded from TOML.
//!
//! Every section is optional; missing keys fall back to the constants in
//! [`super::defaults`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "SENTINEL_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "sentinel.toml";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Root document
// ============================================================================

/// Complete sentinel configuration.
///
/// Search order used by [`SentinelConfig::load`]:
/// 1. `$SENTINEL_CONFIG`
/// 2. `./sentinel.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub interlock: InterlockConfig,

    #[serde(default)]
    pub rul: RulConfig,

    #[serde(default)]
    pub baseline: BaselineConfig,

    #[serde(default)]
    pub root_cause: RootCauseConfig,

    #[serde(default)]
    pub countermeasure: CountermeasureConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl SentinelConfig {
    /// Load using the standard search order. Never fails: a broken file is
    /// logged and skipped.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded sentinel config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded sentinel config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the analysis cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        Self::check_finite(self.interlock.threshold, "interlock.threshold", &mut errors);
        Self::check_finite(self.rul.failure_threshold, "rul.failure_threshold", &mut errors);

        if self.rul.min_samples < 2 {
            errors.push(format!(
                "rul.min_samples ({}) must be at least 2 to fit a trend",
                self.rul.min_samples
            ));
        }
        if !(self.rul.freshness_secs.is_finite() && self.rul.freshness_secs > 0.0) {
            errors.push(format!(
                "rul.freshness_secs ({}) must be positive",
                self.rul.freshness_secs
            ));
        }
        if !(self.rul.concerning_slope.is_finite() && self.rul.concerning_slope >= 0.0) {
            errors.push(format!(
                "rul.concerning_slope ({}) must be non-negative",
                self.rul.concerning_slope
            ));
        }

        let alpha = self.baseline.alpha;
        if !(alpha > 0.0 && alpha < 1.0) {
            errors.push(format!("baseline.alpha ({alpha}) must satisfy 0 < alpha < 1"));
        }

        let r = self.root_cause.correlation_threshold;
        if !(r > 0.0 && r < 1.0) {
            errors.push(format!(
                "root_cause.correlation_threshold ({r}) must satisfy 0 < r < 1"
            ));
        }

        Self::check_finite(
            self.countermeasure.emergency_rul_secs,
            "countermeasure.emergency_rul_secs",
            &mut errors,
        );
        Self::check_finite(
            self.countermeasure.coolant_severity,
            "countermeasure.coolant_severity",
            &mut errors,
        );

        if self.history.window < self.rul.min_samples {
            errors.push(format!(
                "history.window ({}) must be >= rul.min_samples ({})",
                self.history.window, self.rul.min_samples
            ));
        }
        if self.history.lookback_secs <= 0
            || self.history.lookback_secs > defaults::MAX_HISTORY_LOOKBACK_SECS
        {
            errors.push(format!(
                "history.lookback_secs ({}) must satisfy 0 < secs <= {}",
                self.history.lookback_secs,
                defaults::MAX_HISTORY_LOOKBACK_SECS
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_finite(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() {
            errors.push(format!("{name} ({value}) must be a finite number"));
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterlockConfig {
    /// Hard limit for the primary thermal metric
    #[serde(default = "default_interlock_threshold")]
    pub threshold: f64,
}

impl Default for InterlockConfig {
    fn default() -> Self {
        Self {
            threshold: default_interlock_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulConfig {
    #[serde(default = "default_rul_failure_threshold")]
    pub failure_threshold: f64,

    #[serde(default = "default_rul_min_samples")]
    pub min_samples: usize,

    #[serde(default = "default_rul_freshness_secs")]
    pub freshness_secs: f64,

    #[serde(default = "default_rul_concerning_slope")]
    pub concerning_slope: f64,
}

impl Default for RulConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_rul_failure_threshold(),
            min_samples: default_rul_min_samples(),
            freshness_secs: default_rul_freshness_secs(),
            concerning_slope: default_rul_concerning_slope(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineConfig {
    #[serde(default = "default_baseline_alpha")]
    pub alpha: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            alpha: default_baseline_alpha(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCauseConfig {
    #[serde(default = "default_correlation_threshold")]
    pub correlation_threshold: f64,
}

impl Default for RootCauseConfig {
    fn default() -> Self {
        Self {
            correlation_threshold: default_correlation_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountermeasureConfig {
    #[serde(default = "default_emergency_rul_secs")]
    pub emergency_rul_secs: f64,

    #[serde(default = "default_coolant_severity")]
    pub coolant_severity: f64,
}

impl Default for CountermeasureConfig {
    fn default() -> Self {
        Self {
            emergency_rul_secs: default_emergency_rul_secs(),
            coolant_severity: default_coolant_severity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Readings fetched per tool for health analysis
    #[serde(default = "default_history_window")]
    pub window: usize,

    #[serde(default = "default_history_lookback_secs")]
    pub lookback_secs: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window: default_history_window(),
            lookback_secs: default_history_lookback_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the sled databases
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory for the fail-safe shutdown log
    #[serde(default = "default_safety_log_dir")]
    pub safety_log_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            safety_log_dir: default_safety_log_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,

    #[serde(default = "default_tool_id")]
    pub default_tool_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
            default_tool_id: default_tool_id(),
        }
    }
}

fn default_interlock_threshold() -> f64 { defaults::INTERLOCK_THRESHOLD }
fn default_rul_failure_threshold() -> f64 { defaults::RUL_FAILURE_THRESHOLD }
fn default_rul_min_samples() -> usize { defaults::RUL_MIN_SAMPLES }
fn default_rul_freshness_secs() -> f64 { defaults::RUL_FRESHNESS_SECS }
fn default_rul_concerning_slope() -> f64 { defaults::RUL_CONCERNING_SLOPE }
fn default_baseline_alpha() -> f64 { defaults::BASELINE_ALPHA }
fn default_correlation_threshold() -> f64 { defaults::CORRELATION_THRESHOLD }
fn default_emergency_rul_secs() -> f64 { defaults::EMERGENCY_RUL_SECS }
fn default_coolant_severity() -> f64 { defaults::COOLANT_SEVERITY }
fn default_history_window() -> usize { defaults::HISTORY_WINDOW }
fn default_history_lookback_secs() -> i64 { defaults::HISTORY_LOOKBACK_SECS }
fn default_data_dir() -> PathBuf { PathBuf::from(defaults::DATA_DIR) }
fn default_safety_log_dir() -> PathBuf { PathBuf::from(defaults::SAFETY_LOG_DIR) }
fn default_server_addr() -> String { defaults::SERVER_ADDR.to_string() }
fn default_tool_id() -> String { defaults::DEFAULT_TOOL_ID.to_string() }
