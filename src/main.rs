//! Fab Sentinel server
//!
//! Tool health analysis pipeline behind an HTTP API.
//!
//! # Usage
//!
//! ```bash
//! # Serve with defaults (0.0.0.0:8000, ./data, ./logs)
//! cargo run --release
//!
//! # Feed it from the simulator
//! cargo run --bin tool-sim -- --scenario drift | while read -r line; do
//!     curl -s -XPOST localhost:8000/api/v1/telemetry -H 'content-type: application/json' -d "$line"
//! done
//! ```
//!
//! # Environment Variables
//!
//! - `SENTINEL_CONFIG`: Path to a TOML config (default: ./sentinel.toml)
//! - `SENTINEL_CORS_ORIGINS`: Comma-separated allowed origins
//! - `RUST_LOG`: Logging level (default: info)
//! - `RESET_DB`: Set to "true" to wipe telemetry and quarantine data on startup

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fab_sentinel::api::{create_app, ApiState};
use fab_sentinel::config::{self, SentinelConfig};
use fab_sentinel::safety::FileSafetyLog;
use fab_sentinel::storage::{self, SledQuarantineStore, SledTelemetryStore};
use fab_sentinel::ToolHealthPipeline;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "fab-sentinel")]
#[command(about = "Tool health analysis pipeline: SPC, RUL prediction and safety interlocks")]
#[command(version)]
struct CliArgs {
    /// Override the server address (default from config: "0.0.0.0:8000")
    #[arg(short, long)]
    addr: Option<String>,

    /// Path to a TOML config file (takes precedence over SENTINEL_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the data directory holding the database
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the fail-safe safety log directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Wipe telemetry history and quarantine records on startup.
    /// The safety log is never touched.
    #[arg(long)]
    reset_db: bool,

    /// Emit structured JSON logs
    #[arg(long)]
    log_json: bool,
}

/// Check if database reset is requested via CLI flag or environment variable.
fn should_reset_db(cli_flag: bool) -> bool {
    if cli_flag {
        return true;
    }
    std::env::var("RESET_DB")
        .map(|val| matches!(val.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Remove the database inside the data directory.
fn reset_database(data_dir: &Path) -> Result<()> {
    let db_path = data_dir.join(storage::DB_FILE_NAME);
    if !db_path.exists() {
        info!("Database does not exist, nothing to reset");
        return Ok(());
    }
    warn!(path = %db_path.display(), "RESET_DB requested, wiping telemetry and quarantine data");
    std::fs::remove_dir_all(&db_path)
        .with_context(|| format!("Failed to remove database at {}", db_path.display()))?;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

fn load_config(args: &CliArgs) -> Result<SentinelConfig> {
    let mut cfg = match &args.config {
        Some(path) => SentinelConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SentinelConfig::load(),
    };

    if let Some(addr) = &args.addr {
        cfg.server.addr = addr.clone();
    }
    if let Some(dir) = &args.data_dir {
        cfg.storage.data_dir = dir.clone();
    }
    if let Some(dir) = &args.log_dir {
        cfg.storage.safety_log_dir = dir.clone();
    }
    Ok(cfg)
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let cfg = load_config(&args)?;
    config::init(cfg);
    let cfg = config::get();

    if should_reset_db(args.reset_db) {
        reset_database(&cfg.storage.data_dir)?;
    }

    // Fail-safe log first: refuse to run interlocks without it
    let safety_log = FileSafetyLog::open(&cfg.storage.safety_log_dir).with_context(|| {
        format!(
            "Failed to open safety log in {}",
            cfg.storage.safety_log_dir.display()
        )
    })?;

    let db = storage::open_db(&cfg.storage.data_dir).context("Failed to open database")?;
    let telemetry = SledTelemetryStore::new(Arc::clone(&db))?;
    let quarantine = SledQuarantineStore::new(Arc::clone(&db))?;

    let pipeline = Arc::new(ToolHealthPipeline::new(
        Arc::new(telemetry),
        Arc::new(quarantine),
        Arc::new(safety_log),
        cfg,
    ));
    let app = create_app(ApiState::new(Arc::clone(&pipeline), cfg.server.default_tool_id.clone()));

    let listener = tokio::net::TcpListener::bind(&cfg.server.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", cfg.server.addr))?;

    info!("Fab Sentinel v{}", env!("CARGO_PKG_VERSION"));
    info!(
        addr = %cfg.server.addr,
        interlock_threshold = cfg.interlock.threshold,
        data_dir = %cfg.storage.data_dir.display(),
        safety_log_dir = %cfg.storage.safety_log_dir.display(),
        "HTTP server listening"
    );

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
        })
        .await;

    if let Err(e) = &result {
        error!("HTTP server error: {}", e);
    }
    db.flush_async().await.context("Failed to flush database")?;

    info!("{}", pipeline.stats());
    info!("Fab Sentinel shutdown complete");
    result.context("HTTP server error")
}
