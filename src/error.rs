//! Custom error types for gbtim

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for gbtim operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Malformed filename {path:?}: expected {expected}")]
    MalformedFilename { path: PathBuf, expected: &'static str },

    #[error("Malformed project id {value:?} in {path:?}: expected {expected}")]
    MalformedProjectId {
        path: PathBuf,
        value: String,
        expected: &'static str,
    },

    #[error("Unreadable header in {path:?}: {reason}")]
    UnreadableHeader { path: PathBuf, reason: String },

    #[error("Unreadable pointing data in {path:?}: {reason}")]
    UnreadableData { path: PathBuf, reason: String },

    #[error("Ancestor resolution failed for {path:?}: {reason}")]
    AncestorResolution { path: PathBuf, reason: String },

    #[error("Conflicting metadata for {entity} field {field}: stored {stored}, extracted {extracted}")]
    MetadataConflict {
        entity: String,
        field: &'static str,
        stored: String,
        extracted: String,
    },

    #[error("Scan {scan} belongs to session {scan_session}, scan set expects session {set_session}")]
    ScanSetMismatch {
        scan: String,
        scan_session: String,
        set_session: String,
    },

    #[error("Content mismatch for copy {path} on {host}: stored {stored}, computed {computed}")]
    ContentMismatch {
        host: String,
        path: String,
        stored: String,
        computed: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not initialized: run 'gbtim init' first")]
    NotInitialized,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl Error {
    /// True for the uniqueness-violation shape a racing resolver falls back on.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db)) => {
                db.message().contains("UNIQUE constraint failed")
            }
            _ => false,
        }
    }
}

/// Result type alias for gbtim
pub type Result<T> = std::result::Result<T, Error>;
