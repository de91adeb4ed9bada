use std::time::Duration;

use crate::config::Config;
use crate::storage::StageDirs;

/// Immutable snapshot of the configuration each worker needs.
pub struct PipelineConfig {
    pub dirs: StageDirs,
    /// OCR attempt budget per document.
    pub max_retries: u32,
    /// Index write attempts before a document is demoted to Failed.
    /// Independent of the OCR retry count.
    pub store_retry_attempts: u32,
    pub store_retry_delay: Duration,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dirs: StageDirs::from_config(config),
            max_retries: config.max_retries,
            store_retry_attempts: config.max_retries,
            store_retry_delay: config.retry_delay(),
        }
    }
}
