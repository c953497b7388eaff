//! Writing and committing one chunk.
//!
//! A chunk is filled in `uncommitted/chunk_<i>` and published by renaming it to
//! `committed/chunk_<i>`. The rename is the only way a chunk becomes visible, so
//! consumers of `committed/` never observe a partially written chunk.

use std::path::PathBuf;

use log::{debug, trace};

use crate::compression::CompressionType;
use crate::env::Environment;
use crate::error::Result;
use crate::paths::StreamPaths;
use crate::records::RecordFileWriter;

/// Accumulates records into the uncommitted file of a single chunk.
pub struct ChunkWriter<E: Environment> {
    chunk_index: u64,

    path: PathBuf,

    writer: RecordFileWriter<E::WritableFile>,

    /// Estimated serialized size of the records admitted so far.
    size_bytes: u64,
}

impl<E: Environment> ChunkWriter<E> {
    /// Creates `uncommitted/chunk_<chunk_index>`, truncating any leftover file.
    pub fn create(
        env: &E,
        paths: &StreamPaths,
        chunk_index: u64,
        compression_type: CompressionType,
    ) -> Result<Self> {
        let path = paths.uncommitted_chunk_path(chunk_index);
        let writer = RecordFileWriter::new(env.create_file(&path)?, compression_type)?;
        trace!("Opened chunk file {}", path.display());

        Ok(Self {
            chunk_index,
            path,
            writer,
            size_bytes: 0,
        })
    }

    /// Whether another record may be admitted under `max_chunk_size_bytes`.
    ///
    /// The threshold is checked before a record is admitted, so the last record
    /// of a chunk may take it past the threshold.
    pub fn has_capacity(&self, max_chunk_size_bytes: u64) -> bool {
        self.size_bytes < max_chunk_size_bytes
    }

    /// Appends a record to the chunk file.
    pub fn append(&mut self, record: &[u8]) -> Result<()> {
        self.size_bytes += self.writer.write_record(record)?;
        Ok(())
    }

    pub fn chunk_index(&self) -> u64 {
        self.chunk_index
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn num_records(&self) -> u64 {
        self.writer.records_written()
    }

    /// Flushes and syncs the chunk file. The file stays in `uncommitted/`.
    pub fn finish(mut self, env: &E) -> Result<FinishedChunk> {
        self.writer.close()?;
        let num_records = self.writer.records_written();
        env.close_file(self.writer.into_inner())?;

        Ok(FinishedChunk {
            chunk_index: self.chunk_index,
            path: self.path,
            num_records,
            size_bytes: self.size_bytes,
        })
    }
}

/// A complete chunk file waiting in `uncommitted/` for its commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedChunk {
    pub chunk_index: u64,
    pub path: PathBuf,
    pub num_records: u64,
    pub size_bytes: u64,
}

impl FinishedChunk {
    /// Publishes the chunk by renaming it into `committed/`.
    pub fn commit<E: Environment>(&self, env: &E, paths: &StreamPaths) -> Result<()> {
        let committed_path = paths.committed_chunk_path(self.chunk_index);
        env.rename(&self.path, &committed_path)?;
        debug!(
            "Committed chunk {} ({} records, {} bytes) to {}",
            self.chunk_index,
            self.num_records,
            self.size_bytes,
            committed_path.display()
        );
        Ok(())
    }
}
