//! Error types shared by the registry, the clone engine and the readers.
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = CloneError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CloneError {
    /// The export destination could not be written. Nothing is retried.
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A leaf definition record could not be dumped.
    #[error("failed to serialize definition record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid regular expression /{pattern}/{flags}: {message}")]
    Regex {
        pattern: String,
        flags: String,
        message: String,
    },

    /// Generated source that does not belong to the emitted subset.
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// Schema document rejected while deserializing.
    #[error("invalid schema document at {path}: {message}")]
    Document { path: String, message: String },
}
