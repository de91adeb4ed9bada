//! Database error types and the SQLite error classifier.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
///
/// `Duplicate` is a consistency-check failure (the relocator already
/// disambiguated the filename), logged and tolerated. `Unavailable` is the
/// only retryable class; everything else fails the write outright.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// A record with the same unique filename already exists.
    #[error("A record named '{0}' already exists in the index")]
    Duplicate(String),

    /// The store cannot be reached right now (busy, locked, I/O).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    /// Whether the index writer may retry this error with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DatabaseError::Unavailable(_))
    }
}

/// Maps a raw rusqlite error onto the pipeline's taxonomy: UNIQUE
/// violations become `Duplicate` for the given filename, transient
/// engine-level failures become `Unavailable`, the rest pass through.
pub(crate) fn classify_sqlite_error(e: rusqlite::Error, filename: &str) -> DatabaseError {
    use rusqlite::ErrorCode;

    match &e {
        rusqlite::Error::SqliteFailure(ffi, _) => match ffi.code {
            ErrorCode::ConstraintViolation => DatabaseError::Duplicate(filename.to_string()),
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::DiskFull => DatabaseError::Unavailable(e.to_string()),
            _ => DatabaseError::Sqlite(e),
        },
        _ => DatabaseError::Sqlite(e),
    }
}
