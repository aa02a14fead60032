//! Etch Tool Telemetry Simulator
//!
//! Emits one JSON `Reading` per line on stdout:
//! - `default`: an aging tool, temperature creeping up with cycle count
//! - `drift`: 15 readings ramping 182.0 -> 189.0 at 0.5/s with constant
//!   pressure and vibration falling in lockstep; trips the interlock at the end
//!
//! # Usage
//! ```bash
//! ./tool-sim --scenario drift --interval-ms 1000
//! ./tool-sim --tool-id ETCH-002 --count 500 --seed 7
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::Duration;

use fab_sentinel::types::{Metric, Reading};

// ============================================================================
// Tool Constants
// ============================================================================

/// Chamber temperature of a fresh tool (°C)
const BASE_TEMPERATURE: f64 = 180.0;
/// Temperature gained per wafer cycle as the tool ages (°C)
const DRIFT_PER_CYCLE: f64 = 0.005;
/// Chamber pressure (mTorr)
const BASE_PRESSURE: f64 = 10.0;
/// Chuck vibration (mm/s)
const BASE_VIBRATION: f64 = 2.0;
/// Process gas flow (sccm)
const BASE_GAS_FLOW: f64 = 50.0;
/// Above this the tool reports itself as overheating
const OVERHEAT_STATUS_LIMIT: f64 = 185.0;
const LOCATION: &str = "Greenfield-Line1";

/// Drift scenario ramp
const DRIFT_START: f64 = 182.0;
const DRIFT_STEP: f64 = 0.5;
const DRIFT_READINGS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Noisy aging tool, runs until --count
    Default,
    /// Deterministic 15-reading ramp through the interlock threshold
    Drift,
}

#[derive(Parser, Debug)]
#[command(name = "tool-sim")]
#[command(about = "Etch tool telemetry simulator for Fab Sentinel")]
#[command(version)]
struct Args {
    /// Tool identifier stamped on every reading
    #[arg(long, default_value = "ETCH-001")]
    tool_id: String,

    /// Number of readings to emit (default scenario runs forever without it)
    #[arg(long)]
    count: Option<u64>,

    /// Delay between readings in milliseconds (default: 2000, drift: 1000)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, value_enum, default_value = "default")]
    scenario: Scenario,
}

struct EtchTool {
    tool_id: String,
    cycle: u64,
    rng: StdRng,
    temperature_noise: Normal<f64>,
    pressure_noise: Normal<f64>,
    vibration_noise: Normal<f64>,
    gas_flow_noise: Normal<f64>,
}

impl EtchTool {
    fn new(tool_id: String, seed: Option<u64>) -> Result<Self> {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            tool_id,
            cycle: 0,
            rng,
            temperature_noise: Normal::new(0.0, 0.5).context("temperature noise")?,
            pressure_noise: Normal::new(0.0, 0.2).context("pressure noise")?,
            vibration_noise: Normal::new(0.0, 0.05).context("vibration noise")?,
            gas_flow_noise: Normal::new(0.0, 0.5).context("gas flow noise")?,
        })
    }

    fn reading(&self, metrics: BTreeMap<Metric, f64>) -> Reading {
        let temperature = metrics.get(&Metric::Temperature).copied().unwrap_or_default();
        Reading {
            timestamp: Utc::now(),
            tool_id: self.tool_id.clone(),
            wafer_id: format!("WFR-{:04}", self.cycle),
            metrics,
            status: if temperature > OVERHEAT_STATUS_LIMIT {
                "CRITICAL_OVERHEAT".to_string()
            } else {
                "NOMINAL".to_string()
            },
            location: LOCATION.to_string(),
        }
    }

    /// One aging-tool cycle: slow thermal drift plus Gaussian sensor noise.
    fn next_aging(&mut self) -> Reading {
        self.cycle += 1;
        let drift = self.cycle as f64 * DRIFT_PER_CYCLE;

        let mut metrics = BTreeMap::new();
        metrics.insert(
            Metric::Temperature,
            round2(BASE_TEMPERATURE + drift + self.temperature_noise.sample(&mut self.rng)),
        );
        metrics.insert(Metric::Pressure, round2(BASE_PRESSURE + self.pressure_noise.sample(&mut self.rng)));
        metrics.insert(Metric::Vibration, round2(BASE_VIBRATION + self.vibration_noise.sample(&mut self.rng)));
        metrics.insert(Metric::GasFlow, round2(BASE_GAS_FLOW + self.gas_flow_noise.sample(&mut self.rng)));
        self.reading(metrics)
    }

    /// One step of the drift ramp; vibration mirrors temperature inversely.
    fn next_drift(&mut self) -> Reading {
        let step = self.cycle as f64;
        self.cycle += 1;

        let mut metrics = BTreeMap::new();
        metrics.insert(Metric::Temperature, DRIFT_START + step * DRIFT_STEP);
        metrics.insert(Metric::Pressure, BASE_PRESSURE);
        metrics.insert(Metric::Vibration, BASE_VIBRATION + 1.5 - step * 0.1);
        self.reading(metrics)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (count, interval_ms) = match args.scenario {
        Scenario::Default => (args.count, args.interval_ms.unwrap_or(2000)),
        Scenario::Drift => (
            Some(args.count.unwrap_or(DRIFT_READINGS).min(DRIFT_READINGS)),
            args.interval_ms.unwrap_or(1000),
        ),
    };

    let mut tool = EtchTool::new(args.tool_id, args.seed)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut emitted = 0u64;
    while count.map_or(true, |n| emitted < n) {
        let reading = match args.scenario {
            Scenario::Default => tool.next_aging(),
            Scenario::Drift => tool.next_drift(),
        };
        let line = serde_json::to_string(&reading).context("Failed to serialize reading")?;

        // Broken pipe means the consumer went away
        if writeln!(out, "{}", line).and_then(|_| out.flush()).is_err() {
            break;
        }
        emitted += 1;

        if interval_ms > 0 && count.map_or(true, |n| emitted < n) {
            std::thread::sleep(Duration::from_millis(interval_ms));
        }
    }

    Ok(())
}
