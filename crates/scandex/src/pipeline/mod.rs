//! Per-document pipeline: the fixed step sequence one worker runs for one
//! task. Cross-task state (retries, in-flight set) lives in the
//! coordinator, not here.

pub mod config;
pub mod runner;

pub use config::PipelineConfig;
pub use runner::Pipeline;
