//! Error types for snapshot stream operations.

use std::io;
use thiserror::Error;

/// The main error type for snapshot stream operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// An I/O error occurred in the environment.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Something expected on disk does not exist yet. Only raised where
    /// absence is a legitimate state, such as a stream without checkpoints.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A file in a stream directory does not follow the `<prefix>_<index>` grammar.
    #[error("Failed to extract the index for file `{filename}` with prefix `{prefix}`")]
    MalformedFileName { filename: String, prefix: String },

    /// The stream directories are in a state the writer never produces.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The writer was cancelled by its owner.
    #[error("Stream writer was cancelled")]
    Cancelled,

    /// The record source failed to produce, save or restore records.
    #[error("Record source failed: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A record file is damaged.
    #[error("File corruption: {0}")]
    Corruption(String),

    /// The file does not start with the record file signature.
    #[error("Invalid file signature: {0}")]
    InvalidFileSignature(String),

    /// Compression or decompression failed.
    #[error("Compression error: {0}")]
    Compression(String),

    /// The crate was built without support for the compression type.
    #[error("Not compiled with support for compression type: {0}")]
    UnsupportedCompressionType(u8),

    /// Attempted to write to a closed record file.
    #[error("Writing a closed file")]
    WritingClosedFile,

    /// The writer configuration is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SnapshotError {
    /// Wraps an error raised by a [`RecordSource`](crate::source::RecordSource).
    pub fn source_error(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        SnapshotError::Source(err.into())
    }

    /// Returns true for the locally recoverable "nothing there yet" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SnapshotError::NotFound(_))
    }

    /// Returns true if this error reports cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SnapshotError::Cancelled)
    }

    /// Returns true if the stream directories hold something the protocol never writes.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            SnapshotError::Internal(_) | SnapshotError::MalformedFileName { .. }
        )
    }
}

/// A specialized Result type for snapshot stream operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;
