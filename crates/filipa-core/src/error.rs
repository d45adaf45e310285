//! Error types for filipa

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to open store at {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Migration failed: {0}")]
    Migration(#[from] MigrationError),

    #[error("Record {id} already exists in {collection}")]
    DuplicateKey { collection: String, id: String },

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Unknown index {index} on {collection}")]
    UnknownIndex { collection: String, index: String },

    #[error("Invalid record in {collection}: {reason}")]
    InvalidRecord { collection: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Why a store could not be brought up to the current schema
#[derive(Error, Debug)]
pub enum MigrationError {
    /// The store was written by a newer build. Only a reset recovers from this.
    #[error("store is at schema version {found} but this build expects {expected}")]
    VersionConflict { found: u32, expected: u32 },

    #[error("step v{version} ({name}) failed: {reason}")]
    Step {
        version: u32,
        name: &'static str,
        reason: String,
    },
}

impl Error {
    /// True when the caller should offer a reset instead of retrying
    pub fn is_version_conflict(&self) -> bool {
        matches!(
            self,
            Error::Migration(MigrationError::VersionConflict { .. })
        )
    }

    pub(crate) fn open(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        Error::Open {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_record(collection: &str, reason: impl Into<String>) -> Self {
        Error::InvalidRecord {
            collection: collection.to_string(),
            reason: reason.into(),
        }
    }
}
