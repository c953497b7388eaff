//! Read side of a stream: locating committed chunks.
//!
//! Consumers only ever look at `committed/`. Chunk files there are complete and
//! immutable, and their indices form the contiguous range `0..len`.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use glob::{glob, Pattern};

use crate::constants::CHUNK_FILE_PREFIX;
use crate::error::{Result, SnapshotError};
use crate::file_index::file_index;
use crate::paths::StreamPaths;
use crate::records::RecordFileReader;

/// The committed chunks of one stream, ordered by chunk index.
#[derive(Debug, Clone)]
pub struct CommittedChunks {
    paths: StreamPaths,
    chunk_paths: Vec<PathBuf>,
}

impl CommittedChunks {
    /// Lists the committed chunks of stream `stream_index` in `snapshot_path`.
    pub fn for_stream(snapshot_path: impl AsRef<Path>, stream_index: u64) -> Result<Self> {
        Self::open(StreamPaths::new(snapshot_path, stream_index))
    }

    /// Lists the committed chunks of the stream laid out by `paths`.
    ///
    /// Chunks are ordered numerically, so `chunk_10` follows `chunk_9`. A file
    /// that is not a chunk or a gap in the index range is an internal error.
    pub fn open(paths: StreamPaths) -> Result<Self> {
        let directory = paths.committed_chunks_directory();
        let pattern = format!(
            "{}/{}_*",
            Pattern::escape(&directory.to_string_lossy()),
            CHUNK_FILE_PREFIX
        );

        let mut chunks = Vec::new();
        for entry in
            glob(&pattern).map_err(|e| SnapshotError::Internal(format!("Invalid glob pattern: {}", e)))?
        {
            let path = entry.map_err(|e| SnapshotError::Io(e.into_error()))?;
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            chunks.push((file_index(&name, CHUNK_FILE_PREFIX)?, path));
        }
        chunks.sort_unstable();

        for (expected, (chunk_index, path)) in chunks.iter().enumerate() {
            if *chunk_index != expected as u64 {
                return Err(SnapshotError::Internal(format!(
                    "Committed chunks of {} are not contiguous: expected chunk {}, found {}",
                    directory.display(),
                    expected,
                    path.display()
                )));
            }
        }

        Ok(Self {
            chunk_paths: chunks.into_iter().map(|(_, path)| path).collect(),
            paths,
        })
    }

    /// Number of committed chunks.
    pub fn len(&self) -> usize {
        self.chunk_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_paths.is_empty()
    }

    /// Paths of the committed chunks in index order.
    pub fn chunk_paths(&self) -> &[PathBuf] {
        &self.chunk_paths
    }

    /// Whether the writer marked the stream as fully written.
    pub fn is_done(&self) -> bool {
        self.paths.done_file_path().exists()
    }

    /// Opens a reader over the records of chunk `chunk_index`.
    pub fn open_chunk(&self, chunk_index: u64) -> Result<RecordFileReader<BufReader<File>>> {
        let path = self.chunk_paths.get(chunk_index as usize).ok_or_else(|| {
            SnapshotError::NotFound(format!(
                "Chunk {} is not committed in {}",
                chunk_index,
                self.paths.committed_chunks_directory().display()
            ))
        })?;
        RecordFileReader::new(BufReader::new(File::open(path)?))
    }

    /// Reads the records of chunk `chunk_index`.
    pub fn read_chunk(&self, chunk_index: u64) -> Result<Vec<Bytes>> {
        self.open_chunk(chunk_index)?.read_all()
    }

    /// Reads every committed record in stream order.
    pub fn read_all_records(&self) -> Result<Vec<Bytes>> {
        let mut records = Vec::new();
        for chunk_index in 0..self.len() as u64 {
            records.extend(self.read_chunk(chunk_index)?);
        }
        Ok(records)
    }
}
