//! Error types for photometa operations

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PhotometaError {
    #[error("Cannot read {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("Unknown metadata field: {0}")]
    UnknownField(String),

    #[error("Write failed for {}: {reason} (original file left unmodified)", .path.display())]
    WriteFailed { path: PathBuf, reason: String },

    #[error("Directory unavailable: {}", .0.display())]
    DirectoryUnavailable(PathBuf),

    #[error("Unsupported image format for {}: {reason}", .path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a photometa library (no .photometa directory). Run 'photometa init' first.")]
    NotInitialized,

    #[error("Config already exists at {}", .0.display())]
    ConfigExists(PathBuf),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Field table invalid: {0}")]
    FieldTable(String),

    #[error("Schema version mismatch: database is v{found}, expected v{expected}. Delete .photometa/index.db and rescan.")]
    SchemaVersionMismatch { found: i32, expected: i32 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PhotometaError {
    /// Build an `Unreadable` error from an io error for a specific file.
    pub fn unreadable(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::Unreadable {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }

    /// Build a `WriteFailed` error for a specific file.
    pub fn write_failed(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::WriteFailed {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }
}
