//! Paths of the directories and files owned by one stream.

use std::path::{Path, PathBuf};

use crate::constants::{
    CHECKPOINTS_DIRECTORY, CHECKPOINT_FILE_PREFIX, CHUNK_FILE_PREFIX, COMMITTED_CHUNKS_DIRECTORY,
    DONE_FILE_NAME, STREAMS_DIRECTORY, UNCOMMITTED_CHUNKS_DIRECTORY,
};
use crate::file_index::file_name;

/// Layout of `<snapshot_path>/streams/<stream_index>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPaths {
    stream_directory: PathBuf,
    committed_chunks_directory: PathBuf,
    uncommitted_chunks_directory: PathBuf,
    checkpoints_directory: PathBuf,
}

impl StreamPaths {
    pub fn new(snapshot_path: impl AsRef<Path>, stream_index: u64) -> Self {
        let stream_directory = snapshot_path
            .as_ref()
            .join(STREAMS_DIRECTORY)
            .join(stream_index.to_string());
        Self::for_stream_directory(stream_directory)
    }

    /// Uses `stream_directory` directly as the stream root.
    pub fn for_stream_directory(stream_directory: impl Into<PathBuf>) -> Self {
        let stream_directory = stream_directory.into();
        Self {
            committed_chunks_directory: stream_directory.join(COMMITTED_CHUNKS_DIRECTORY),
            uncommitted_chunks_directory: stream_directory.join(UNCOMMITTED_CHUNKS_DIRECTORY),
            checkpoints_directory: stream_directory.join(CHECKPOINTS_DIRECTORY),
            stream_directory,
        }
    }

    pub fn stream_directory(&self) -> &Path {
        &self.stream_directory
    }

    pub fn committed_chunks_directory(&self) -> &Path {
        &self.committed_chunks_directory
    }

    pub fn uncommitted_chunks_directory(&self) -> &Path {
        &self.uncommitted_chunks_directory
    }

    pub fn checkpoints_directory(&self) -> &Path {
        &self.checkpoints_directory
    }

    pub fn committed_chunk_path(&self, chunk_index: u64) -> PathBuf {
        self.committed_chunks_directory
            .join(file_name(CHUNK_FILE_PREFIX, chunk_index))
    }

    pub fn uncommitted_chunk_path(&self, chunk_index: u64) -> PathBuf {
        self.uncommitted_chunks_directory
            .join(file_name(CHUNK_FILE_PREFIX, chunk_index))
    }

    pub fn checkpoint_path(&self, checkpoint_index: u64) -> PathBuf {
        self.checkpoints_directory
            .join(file_name(CHECKPOINT_FILE_PREFIX, checkpoint_index))
    }

    /// Marker written once the stream has been fully committed.
    pub fn done_file_path(&self) -> PathBuf {
        self.stream_directory.join(DONE_FILE_NAME)
    }
}
