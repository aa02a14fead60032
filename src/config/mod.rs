//! Sentinel Configuration Module
//!
//! Operator-tunable thresholds and paths loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `SENTINEL_CONFIG` environment variable (path to TOML file)
//! 2. `sentinel.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(SentinelConfig::load());
//!
//! // Anywhere in the codebase:
//! let limit = config::get().interlock.threshold;
//! ```

mod sentinel_config;
pub mod defaults;

pub use sentinel_config::*;

use std::sync::OnceLock;

/// Global configuration, initialized once at startup.
static SENTINEL_CONFIG: OnceLock<SentinelConfig> = OnceLock::new();

/// Initialize the global configuration.
///
/// Only the first call takes effect; later calls are logged and ignored.
pub fn init(config: SentinelConfig) {
    if SENTINEL_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get the global configuration.
///
/// Falls back to a static default instance when `init()` has not run
/// (library use and tests).
pub fn get() -> &'static SentinelConfig {
    static DEFAULT: OnceLock<SentinelConfig> = OnceLock::new();
    SENTINEL_CONFIG
        .get()
        .unwrap_or_else(|| DEFAULT.get_or_init(SentinelConfig::default))
}
