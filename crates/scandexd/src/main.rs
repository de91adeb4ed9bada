//! Headless daemon: runs the ingestion coordinator until SIGINT/SIGTERM.

use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use scandex::sanitize::redact_path;
use scandex::{Config, ConfigError, Coordinator, Database, TesseractEngine, TextEngine};

fn main() {
    if let Err(e) = run() {
        eprintln!("scandexd: {e}");
        std::process::exit(1);
    }
}

fn run() -> scandex::Result<()> {
    let config = Config::from_env()?;
    config.ensure_directories()?;
    init_logging(&config)?;

    info!("scandexd v{} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Stages: {} -> {} | {} | {}",
        redact_path(&config.scan_dir),
        redact_path(&config.fully_indexed_dir),
        redact_path(&config.partial_indexed_dir),
        redact_path(&config.failed_dir),
    );
    info!("Database: {}", redact_path(&config.database_path));
    info!(
        "Workers: {}, OCR languages: {}, {} dpi",
        config.worker_count,
        config.ocr_languages.join("+"),
        config.ocr_dpi,
    );

    let db = Database::open(&config.database_path)?;
    let engine: Arc<dyn TextEngine> =
        Arc::new(TesseractEngine::new(&config.ocr_languages, config.ocr_dpi));

    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        signal_flag.store(true, Ordering::Relaxed);
    }) {
        warn!("Could not install signal handler, stop via SIGKILL only: {e}");
    }

    let coordinator = Coordinator::new(&config, engine, db, shutdown);
    let summary = coordinator.run();

    match serde_json::to_string(&summary) {
        Ok(json) => info!("Run finished: {json}"),
        Err(e) => warn!("Run finished, summary not serializable: {e}"),
    }

    Ok(())
}

/// Compact console output plus a JSON log file under the configured log
/// directory. `RUST_LOG` overrides the configured level.
fn init_logging(config: &Config) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| ConfigError::InitLogging(e.to_string()))?;

    let log_path = config.log_file_path();
    let log_file = File::options()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|source| ConfigError::OpenLogFile {
            path: log_path,
            source,
        })?;

    // Route `log` macro records from the library into tracing.
    tracing_log::LogTracer::init().map_err(|e| ConfigError::InitLogging(e.to_string()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Arc::new(log_file)),
        )
        .try_init()
        .map_err(|e| ConfigError::InitLogging(e.to_string()))?;

    Ok(())
}
