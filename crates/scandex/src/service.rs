//! Library facade consumed by the HTTP service layer.
//!
//! Read operations over the stage directories and the index store, plus
//! the "process this file now" write trigger. Response types serialize to
//! camelCase for the transport layer.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::classify::Stage;
use crate::coordinator::CoordinatorHandle;
use crate::db::{document_repo, Database, DatabaseError, ScannedDocument};
use crate::error::WorkerError;
use crate::storage::StageDirs;

/// File counts per stage directory.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCounts {
    pub scan: usize,
    pub fully_indexed: usize,
    pub partially_indexed: usize,
    pub failed: usize,
}

pub struct PipelineService {
    dirs: StageDirs,
    db: Database,
    coordinator: CoordinatorHandle,
}

impl PipelineService {
    pub fn new(dirs: StageDirs, db: Database, coordinator: CoordinatorHandle) -> Self {
        Self {
            dirs,
            db,
            coordinator,
        }
    }

    /// Counts of documents currently in each stage directory.
    pub fn stage_counts(&self) -> StageCounts {
        StageCounts {
            scan: count_files(&self.dirs.scan),
            fully_indexed: count_files(&self.dirs.fully_indexed),
            partially_indexed: count_files(&self.dirs.partially_indexed),
            failed: count_files(&self.dirs.failed),
        }
    }

    /// Point lookup by the record's unique filename.
    pub fn find_by_filename(
        &self,
        filename: &str,
    ) -> Result<Option<ScannedDocument>, DatabaseError> {
        document_repo::find_by_filename(&self.db, filename)
    }

    /// Case-insensitive substring search on client name or account number,
    /// most recently indexed first.
    pub fn search(&self, term: &str) -> Result<Vec<ScannedDocument>, DatabaseError> {
        document_repo::search(&self.db, term)
    }

    /// File names currently in the directory for `stage`, sorted.
    pub fn list_stage(&self, stage: Stage) -> Vec<String> {
        let mut names: Vec<String> = WalkDir::new(self.dirs.stage_dir(stage))
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    /// Finds which stage directory currently holds `filename`.
    ///
    /// Terminal directories are checked first, then intake. The name is
    /// joined traversal-safely: anything that would resolve outside the
    /// stage directory is rejected, never joined.
    pub fn locate_file(&self, filename: &str) -> Option<(Stage, PathBuf)> {
        for stage in [
            Stage::FullyIndexed,
            Stage::PartiallyIndexed,
            Stage::Failed,
            Stage::Discovered,
        ] {
            let path = safe_join(self.dirs.stage_dir(stage), filename)?;
            if path.is_file() {
                return Some((stage, path));
            }
        }
        None
    }

    /// Write trigger: process a newly arrived file without the settle wait.
    pub fn submit_now(&self, path: PathBuf) -> Result<(), WorkerError> {
        self.coordinator.submit_now(path)
    }
}

fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

/// Joins a client-supplied filename onto a stage directory, rejecting
/// anything that is not a plain file name (separators, `..`, absolute
/// paths, empty).
fn safe_join(dir: &Path, filename: &str) -> Option<PathBuf> {
    if filename.is_empty() {
        return None;
    }

    let candidate = Path::new(filename);
    let mut components = candidate.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == filename => Some(dir.join(name)),
        _ => None,
    }
}
