pub mod classify;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod service;
pub mod storage;
pub mod worker;

pub use classify::{Classifier, Decision, Stage};
pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorHandle, RunSummary};
pub use db::{Database, DatabaseError, ScannedDocument};
pub use error::{ConfigError, ProcessError, Result, ScandexError, StorageError, WorkerError};
pub use extract::{DocumentFields, ExtractionResult, FieldExtractor};
pub use pipeline::{Pipeline, PipelineConfig};
pub use processor::{DocumentKind, TesseractEngine, TextEngine};
pub use service::{PipelineService, StageCounts};
pub use storage::{Relocator, StageDirs};
