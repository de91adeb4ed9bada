//! Runtime configuration, loaded from environment variables.
//!
//! Every knob has a default so the pipeline runs with no configuration at
//! all; invalid values are reported as [`ConfigError::Invalid`] at startup
//! rather than silently falling back.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigError;

/// Intake directory for newly scanned documents.
pub const ENV_SCAN_DIR: &str = "SCAN_DIR";
/// Destination for documents with all metadata fields found.
pub const ENV_FULLY_INDEXED_DIR: &str = "FULLY_INDEXED_DIR";
/// Destination for documents with some metadata fields found.
pub const ENV_PARTIAL_INDEXED_DIR: &str = "PARTIAL_INDEXED_DIR";
/// Destination for documents that exhausted their attempts.
pub const ENV_FAILED_DIR: &str = "FAILED_DIR";
/// Directory receiving the JSON log file.
pub const ENV_LOG_DIR: &str = "LOG_DIR";
/// Page rendering resolution for OCR, in dots per inch.
pub const ENV_OCR_DPI: &str = "OCR_DPI";
/// Tesseract language codes, separated by `,` or `+`.
pub const ENV_OCR_LANGUAGES: &str = "OCR_LANGUAGES";
/// Attempt budget per document before it is routed to the failed stage.
pub const ENV_MAX_RETRIES: &str = "MAX_RETRIES";
/// Seconds between retry attempts for one document.
pub const ENV_RETRY_DELAY: &str = "RETRY_DELAY";
/// Seconds between coordinator batch ticks.
pub const ENV_BATCH_DELAY: &str = "BATCH_DELAY";
/// Seconds a file must sit unchanged before it counts as discovered.
pub const ENV_PROCESS_DELAY: &str = "PROCESS_DELAY";
/// Number of worker threads.
pub const ENV_WORKER_COUNT: &str = "WORKER_COUNT";
/// SQLite database file path.
pub const ENV_DATABASE_PATH: &str = "DATABASE_PATH";
/// Default log filter when `RUST_LOG` is not set.
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

const MAX_DEFAULT_WORKERS: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub scan_dir: PathBuf,
    pub fully_indexed_dir: PathBuf,
    pub partial_indexed_dir: PathBuf,
    pub failed_dir: PathBuf,
    pub log_dir: PathBuf,
    pub ocr_dpi: u32,
    pub ocr_languages: Vec<String>,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    pub batch_delay_secs: f64,
    pub process_delay_secs: f64,
    pub worker_count: usize,
    pub database_path: PathBuf,
    pub log_level: String,
}

fn default_worker_count() -> usize {
    num_cpus::get().min(MAX_DEFAULT_WORKERS)
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_dir: PathBuf::from("incoming-scan"),
            fully_indexed_dir: PathBuf::from("fully_indexed"),
            partial_indexed_dir: PathBuf::from("partially_indexed"),
            failed_dir: PathBuf::from("failed"),
            log_dir: PathBuf::from("logs"),
            ocr_dpi: 600,
            ocr_languages: default_languages(),
            max_retries: 3,
            retry_delay_secs: 1.0,
            batch_delay_secs: 0.5,
            process_delay_secs: 5.0,
            worker_count: default_worker_count(),
            database_path: crate::db::default_database_path()
                .unwrap_or_else(|| PathBuf::from("scandex.db")),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Builds the configuration from the process environment, applying
    /// defaults for unset keys.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Self {
            scan_dir: env_path(ENV_SCAN_DIR, defaults.scan_dir),
            fully_indexed_dir: env_path(ENV_FULLY_INDEXED_DIR, defaults.fully_indexed_dir),
            partial_indexed_dir: env_path(ENV_PARTIAL_INDEXED_DIR, defaults.partial_indexed_dir),
            failed_dir: env_path(ENV_FAILED_DIR, defaults.failed_dir),
            log_dir: env_path(ENV_LOG_DIR, defaults.log_dir),
            ocr_dpi: env_parse(ENV_OCR_DPI, defaults.ocr_dpi, |v: &u32| {
                if *v == 0 { Err("must be positive") } else { Ok(()) }
            })?,
            ocr_languages: env_languages(ENV_OCR_LANGUAGES, defaults.ocr_languages)?,
            max_retries: env_parse(ENV_MAX_RETRIES, defaults.max_retries, |v: &u32| {
                if *v == 0 { Err("must be at least 1") } else { Ok(()) }
            })?,
            retry_delay_secs: env_parse(ENV_RETRY_DELAY, defaults.retry_delay_secs, non_negative)?,
            batch_delay_secs: env_parse(ENV_BATCH_DELAY, defaults.batch_delay_secs, non_negative)?,
            process_delay_secs: env_parse(
                ENV_PROCESS_DELAY,
                defaults.process_delay_secs,
                non_negative,
            )?,
            worker_count: env_parse(ENV_WORKER_COUNT, defaults.worker_count, |v: &usize| {
                if *v == 0 { Err("must be at least 1") } else { Ok(()) }
            })?,
            database_path: env_path(ENV_DATABASE_PATH, defaults.database_path),
            log_level: env_string(ENV_LOG_LEVEL, defaults.log_level),
        })
    }

    /// Creates the stage and log directories if they do not exist yet.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        for dir in [
            &self.scan_dir,
            &self.fully_indexed_dir,
            &self.partial_indexed_dir,
            &self.failed_dir,
            &self.log_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDirectory {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_secs_f64(self.batch_delay_secs)
    }

    /// Settle interval the watcher waits before a file counts as stable.
    pub fn process_delay(&self) -> Duration {
        Duration::from_secs_f64(self.process_delay_secs)
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.log_dir.join("scandex.log")
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_string(key: &str, default: String) -> String {
    env_value(key).unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    env_value(key).map(PathBuf::from).unwrap_or(default)
}

fn env_parse<T>(
    key: &'static str,
    default: T,
    validate: impl Fn(&T) -> std::result::Result<(), &'static str>,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = env_value(key) else {
        return Ok(default);
    };
    let parsed = raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        value: raw.clone(),
        reason: e.to_string(),
    })?;
    validate(&parsed).map_err(|reason| ConfigError::Invalid {
        key,
        value: raw,
        reason: reason.to_string(),
    })?;
    Ok(parsed)
}

fn env_languages(key: &'static str, default: Vec<String>) -> Result<Vec<String>, ConfigError> {
    let Some(raw) = env_value(key) else {
        return Ok(default);
    };
    let languages: Vec<String> = raw
        .split([',', '+'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if languages.is_empty() {
        return Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "no language codes given".to_string(),
        });
    }
    Ok(languages)
}

fn non_negative(v: &f64) -> std::result::Result<(), &'static str> {
    if v.is_finite() && *v >= 0.0 {
        Ok(())
    } else {
        Err("must be a non-negative number of seconds")
    }
}
