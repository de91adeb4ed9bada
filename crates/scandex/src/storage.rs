//! Stage-directory storage: moving documents between pipeline stages.
//!
//! A document's stage is encoded by the directory it lives in, so the move
//! is the state transition. The contract on failure: the source file stays
//! where it was, and a document is never observable in two stage
//! directories at once.

use std::path::{Path, PathBuf};

use crate::classify::Stage;
use crate::config::Config;
use crate::error::StorageError;

/// The four directories a document can physically live in.
#[derive(Debug, Clone)]
pub struct StageDirs {
    pub scan: PathBuf,
    pub fully_indexed: PathBuf,
    pub partially_indexed: PathBuf,
    pub failed: PathBuf,
}

impl StageDirs {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scan: config.scan_dir.clone(),
            fully_indexed: config.fully_indexed_dir.clone(),
            partially_indexed: config.partial_indexed_dir.clone(),
            failed: config.failed_dir.clone(),
        }
    }

    /// Directory encoding the given stage. Documents in the in-memory
    /// stages (Discovered, Processing) still live in the intake directory.
    pub fn stage_dir(&self, stage: Stage) -> &Path {
        match stage {
            Stage::Discovered | Stage::Processing => &self.scan,
            Stage::FullyIndexed => &self.fully_indexed,
            Stage::PartiallyIndexed => &self.partially_indexed,
            Stage::Failed => &self.failed,
        }
    }
}

/// Moves documents into stage directories with collision-safe naming.
pub struct Relocator {
    dirs: StageDirs,
}

impl Relocator {
    pub fn new(dirs: StageDirs) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &StageDirs {
        &self.dirs
    }

    /// Moves `source` into the directory for `target_stage` and returns the
    /// final path.
    ///
    /// A name collision at the destination gets a counter suffix
    /// (`scan.pdf`, `scan_2.pdf`, ...); the name is reserved atomically so
    /// two workers can never pick the same one. If anything fails, the
    /// source file is untouched in its original directory.
    pub fn relocate(&self, source: &Path, target_stage: Stage) -> Result<PathBuf, StorageError> {
        let dir = self.dirs.stage_dir(target_stage);
        ensure_directory(dir)?;

        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::InvalidSource(source.to_path_buf()))?;

        let dest = reserve_name(dir, file_name)?;
        match move_file(source, &dest) {
            Ok(()) => Ok(dest),
            Err(e) => {
                // Release the reserved name so a later attempt can claim it.
                let _ = std::fs::remove_file(&dest);
                Err(e)
            }
        }
    }
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Claims a free destination name with `O_CREAT | O_EXCL` semantics,
/// probing `name.ext`, `name_2.ext`, ... The returned path holds an empty
/// placeholder the caller replaces or removes.
fn reserve_name(dir: &Path, filename: &str) -> Result<PathBuf, StorageError> {
    let (base, ext) = match filename.rfind('.') {
        Some(dot_pos) => (&filename[..dot_pos], Some(&filename[dot_pos..])),
        None => (filename, None),
    };

    for counter in 1..=1000 {
        let candidate = if counter == 1 {
            filename.to_string()
        } else {
            match ext {
                Some(ext) => format!("{}_{}{}", base, counter, ext),
                None => format!("{}_{}", base, counter),
            }
        };

        let candidate_path = dir.join(&candidate);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate_path)
        {
            Ok(_) => return Ok(candidate_path),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(StorageError::ReserveName {
                    dir: dir.to_path_buf(),
                    name: candidate,
                    source: e,
                });
            }
        }
    }

    Err(StorageError::NoFreeName(dir.join(filename)))
}

/// Moves a file with `rename` first (atomic on the same filesystem),
/// falling back to copy + remove for cross-device moves and filesystems
/// that refuse to rename over the reserved placeholder.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    if let Err(e) = std::fs::remove_file(src) {
        // Keep the single-location invariant: drop the copy, keep the
        // source where the task believes it is.
        let _ = std::fs::remove_file(dst);
        return Err(StorageError::MoveFile {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}
