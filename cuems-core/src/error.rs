use std::path::PathBuf;

use thiserror::Error;

/// The full error taxonomy surfaced by the library store, media/project
/// services, upload pipeline, and engine RPC bridge. Every variant maps to
/// exactly one wire error kind at the session layer.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no such {kind}: {id}")]
    NonExistentItem { kind: &'static str, id: String },

    #[error("file integrity check failed for {path}: expected md5 {expected}, got {actual}")]
    FileIntegrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("value is not a valid timecode: {value:?}")]
    NotTimecode { value: String },

    #[error("engine rejected request: {0}")]
    Engine(String),

    #[error("engine request timed out after {0:?}")]
    EngineTimeout(std::time::Duration),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CoreError {
    pub fn non_existent(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NonExistentItem {
            kind,
            id: id.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The wire error kind this variant maps to (see `spec.md` §7).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NonExistentItem { .. } => "non_existent_item",
            Self::FileIntegrity { .. } => "file_integrity",
            Self::NotTimecode { .. } => "not_timecode",
            Self::Engine(_) | Self::EngineTimeout(_) => "engine",
            Self::Conflict(_) => "conflict",
            Self::Io { .. } | Self::Database(_) => "transient_io",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
