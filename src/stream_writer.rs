// Copyright 2024
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The stream writer loop.
//!
//! A [`StreamWriter`] owns one stream. It creates the stream directories, runs
//! recovery, then writes chunks until the source is exhausted, the writer is
//! cancelled, or an operation fails. Every chunk goes through the same sequence:
//!
//! 1. Records are appended to `uncommitted/chunk_<i>` until the size threshold
//!    or the end of input is reached.
//! 2. Unless the input has ended, the source state is saved as `checkpoint_<i>`.
//! 3. The chunk is renamed to `committed/chunk_<i>`.
//!
//! The checkpoint is saved before the rename on every chunk. A crash between
//! steps 2 and 3 leaves a chunk that recovery commits; a crash before step 2
//! leaves a chunk that recovery discards and regenerates.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use log::{debug, error, info, trace};

use crate::checkpoint::CheckpointManager;
use crate::chunk_writer::{ChunkWriter, FinishedChunk};
use crate::compression::CompressionType;
use crate::constants::{DEFAULT_MAX_CHUNK_SIZE_BYTES, DONE_TEMP_FILE_PREFIX};
use crate::env::Environment;
use crate::error::{Result, SnapshotError};
use crate::paths::StreamPaths;
use crate::recovery::RecoveryCoordinator;
use crate::source::{RecordSource, SourcePiece};

/// Configuration for a StreamWriter.
#[derive(Debug, Clone)]
pub struct StreamWriterConfig {
    /// Root of the snapshot; the stream lives in `<snapshot_path>/streams/<stream_index>`.
    pub snapshot_path: PathBuf,

    /// Index of the stream this writer owns.
    pub stream_index: u64,

    /// Compression applied to chunk and checkpoint records.
    pub compression_type: CompressionType,

    /// Size threshold of a chunk in bytes (uncompressed).
    ///
    /// Records are admitted while the chunk is below this size, so a chunk ends
    /// with the first record that reaches or crosses it.
    pub max_chunk_size_bytes: u64,
}

impl StreamWriterConfig {
    pub fn new(snapshot_path: impl Into<PathBuf>, stream_index: u64) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            stream_index,
            compression_type: CompressionType::None,
            max_chunk_size_bytes: DEFAULT_MAX_CHUNK_SIZE_BYTES,
        }
    }

    pub fn with_compression(mut self, compression_type: CompressionType) -> Self {
        self.compression_type = compression_type;
        self
    }

    pub fn with_max_chunk_size_bytes(mut self, max_chunk_size_bytes: u64) -> Self {
        self.max_chunk_size_bytes = max_chunk_size_bytes;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_chunk_size_bytes == 0 {
            return Err(SnapshotError::InvalidConfig(
                "max_chunk_size_bytes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a stream writer.
#[derive(Debug, Clone)]
pub enum WriterStatus {
    /// No failure so far. After the writer finished, the stream is complete.
    Ok,

    /// The owner cancelled the writer.
    Cancelled,

    /// The writer stopped at its first fatal error.
    Failed(Arc<SnapshotError>),
}

impl WriterStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, WriterStatus::Ok)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WriterStatus::Cancelled)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, WriterStatus::Failed(_))
    }

    /// The error a failed writer stopped at.
    pub fn error(&self) -> Option<&SnapshotError> {
        match self {
            WriterStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Where the writer is in its lifecycle.
///
/// `Initializing → Restoring → Writing → {Completed | Cancelled | Failed}`.
/// The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterPhase {
    Initializing,
    Restoring,
    Writing,
    Completed,
    Cancelled,
    Failed,
}

impl WriterPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WriterPhase::Completed | WriterPhase::Cancelled | WriterPhase::Failed
        )
    }
}

#[derive(Debug)]
struct Progress {
    status: WriterStatus,
    phase: WriterPhase,
    /// Sticky once the source reported exhaustion.
    end_of_input: bool,
}

/// State shared between the writer loop and its owner. Every access takes the lock.
#[derive(Debug)]
struct SharedState {
    progress: Mutex<Progress>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            progress: Mutex::new(Progress {
                status: WriterStatus::Ok,
                phase: WriterPhase::Initializing,
                end_of_input: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        // Progress is a set of plain flags; it stays consistent even if a holder panicked.
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> WriterStatus {
        self.lock().status.clone()
    }

    fn phase(&self) -> WriterPhase {
        self.lock().phase
    }

    fn set_phase(&self, phase: WriterPhase) {
        let mut progress = self.lock();
        if !progress.phase.is_terminal() {
            progress.phase = phase;
        }
    }

    fn cancel(&self) {
        let mut progress = self.lock();
        if progress.phase.is_terminal() || !progress.status.is_ok() {
            return;
        }
        progress.status = WriterStatus::Cancelled;
    }

    /// Records the first fatal error. A cancellation observed earlier wins.
    fn fail(&self, err: SnapshotError) {
        let mut progress = self.lock();
        if progress.status.is_ok() {
            progress.status = WriterStatus::Failed(Arc::new(err));
        }
    }

    fn set_end_of_input(&self) {
        self.lock().end_of_input = true;
    }

    fn end_of_input(&self) -> bool {
        self.lock().end_of_input
    }

    fn should_write_chunk(&self) -> bool {
        let progress = self.lock();
        !progress.end_of_input && progress.status.is_ok()
    }

    /// Decides, under one lock, whether a finished chunk is committed and
    /// whether a checkpoint precedes the commit.
    ///
    /// Returns `Ok(true)` when a checkpoint must be saved, `Ok(false)` when the
    /// input has ended and the chunk is committed without one, and
    /// [`SnapshotError::Cancelled`] when the chunk must stay uncommitted.
    fn commit_requires_checkpoint(&self) -> Result<bool> {
        let progress = self.lock();
        if !progress.status.is_ok() {
            return Err(SnapshotError::Cancelled);
        }
        Ok(!progress.end_of_input)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.lock().status.is_ok() {
            Ok(())
        } else {
            Err(SnapshotError::Cancelled)
        }
    }

    /// Moves to the terminal phase matching the status and returns the status.
    fn finish(&self) -> WriterStatus {
        let mut progress = self.lock();
        if !progress.phase.is_terminal() {
            progress.phase = match progress.status {
                WriterStatus::Ok => WriterPhase::Completed,
                WriterStatus::Cancelled => WriterPhase::Cancelled,
                WriterStatus::Failed(_) => WriterPhase::Failed,
            };
        }
        progress.status.clone()
    }
}

/// Writes one stream of records as committed chunks, resuming from checkpoints.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use snapshot_stream::{LocalEnvironment, StreamWriter, StreamWriterConfig, VecRecordSource};
///
/// let config = StreamWriterConfig::new("/tmp/snapshot", 0).with_max_chunk_size_bytes(1 << 20);
/// let source = VecRecordSource::from_slices(&["record 1", "record 2"]);
/// let writer = StreamWriter::new(config, Arc::new(LocalEnvironment::new()), source).unwrap();
///
/// let mut handle = writer.start().unwrap();
/// let status = handle.wait();
/// assert!(status.is_ok());
/// ```
pub struct StreamWriter<E: Environment, S: RecordSource> {
    config: StreamWriterConfig,

    env: Arc<E>,

    source: S,

    paths: StreamPaths,

    checkpoints: CheckpointManager,

    state: Arc<SharedState>,

    /// Index of the next chunk to write.
    chunk_index: u64,
}

impl<E: Environment, S: RecordSource> StreamWriter<E, S> {
    /// Creates a writer. Nothing touches the file system until [`run`](Self::run)
    /// or [`start`](Self::start).
    pub fn new(config: StreamWriterConfig, env: Arc<E>, source: S) -> Result<Self> {
        config.validate()?;
        let paths = StreamPaths::new(&config.snapshot_path, config.stream_index);
        let checkpoints = CheckpointManager::new(paths.clone(), config.compression_type);

        Ok(Self {
            config,
            env,
            source,
            paths,
            checkpoints,
            state: Arc::new(SharedState::new()),
            chunk_index: 0,
        })
    }

    /// Runs the writer on a background task and returns the handle to wait on it.
    ///
    /// Failing to start the task is returned here; the writer never runs in that case.
    pub fn start(mut self) -> Result<StreamWriterHandle> {
        let state = Arc::clone(&self.state);
        let env = Arc::clone(&self.env);
        let name = format!("snapshot_stream_writer_{}", self.config.stream_index);

        let thread = env.spawn(
            &name,
            Box::new(move || {
                self.run();
            }),
        )?;

        Ok(StreamWriterHandle {
            state,
            thread: Some(thread),
        })
    }

    /// Runs the writer to completion on the calling thread and returns its final status.
    pub fn run(&mut self) -> WriterStatus {
        info!(
            "Starting stream writer for {}",
            self.paths.stream_directory().display()
        );

        if let Err(e) = self.write_stream() {
            if !e.is_cancelled() {
                error!(
                    "Stream writer for {} failed: {}",
                    self.paths.stream_directory().display(),
                    e
                );
            }
            self.state.fail(e);
        }

        let status = self.state.finish();
        info!(
            "Stream writer for {} finished at chunk {} with status {:?}",
            self.paths.stream_directory().display(),
            self.chunk_index,
            status
        );
        status
    }

    /// Asks the writer to stop before its next chunk or record.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn status(&self) -> WriterStatus {
        self.state.status()
    }

    pub fn phase(&self) -> WriterPhase {
        self.state.phase()
    }

    /// Index of the next chunk the writer will produce.
    pub fn chunk_index(&self) -> u64 {
        self.chunk_index
    }

    pub fn paths(&self) -> &StreamPaths {
        &self.paths
    }

    fn write_stream(&mut self) -> Result<()> {
        if self.env.file_exists(&self.paths.done_file_path())? {
            info!(
                "Stream {} is already done; nothing to write",
                self.paths.stream_directory().display()
            );
            return Ok(());
        }

        self.initialize_directories()?;

        self.state.set_phase(WriterPhase::Restoring);
        self.restore()?;

        self.state.set_phase(WriterPhase::Writing);
        while self.state.should_write_chunk() {
            self.write_chunk()?;
        }

        self.state.ensure_running()?;
        if self.state.end_of_input() {
            self.write_done_file()?;
        }
        Ok(())
    }

    fn initialize_directories(&self) -> Result<()> {
        self.env
            .create_dir_all(self.paths.committed_chunks_directory())?;
        self.env
            .create_dir_all(self.paths.uncommitted_chunks_directory())?;
        self.env.create_dir_all(self.paths.checkpoints_directory())?;
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        let outcome = RecoveryCoordinator::new(&*self.env, &self.paths, &self.checkpoints)
            .restore(&mut self.source)?;
        self.chunk_index = outcome.next_chunk_index;

        if outcome.checkpoint_index.is_some() {
            info!(
                "Resuming stream at chunk {} ({} chunks committed and {} discarded during recovery)",
                self.chunk_index,
                outcome.promoted_chunks.len(),
                outcome.discarded_chunks.len()
            );
        }
        Ok(())
    }

    fn write_chunk(&mut self) -> Result<()> {
        let mut chunk = ChunkWriter::create(
            &*self.env,
            &self.paths,
            self.chunk_index,
            self.config.compression_type,
        )?;

        while self.should_write_record(&chunk) {
            self.write_record(&mut chunk)?;
        }

        let chunk = chunk.finish(&*self.env)?;
        self.commit_chunk(chunk)
    }

    fn should_write_record(&self, chunk: &ChunkWriter<E>) -> bool {
        chunk.has_capacity(self.config.max_chunk_size_bytes) && self.state.should_write_chunk()
    }

    fn write_record(&mut self, chunk: &mut ChunkWriter<E>) -> Result<()> {
        match self.source.next_record()? {
            SourcePiece::Record(record) => {
                trace!(
                    "Appending {} byte record to chunk {}",
                    record.len(),
                    chunk.chunk_index()
                );
                chunk.append(&record)
            }
            SourcePiece::EndOfInput => {
                debug!(
                    "Source exhausted while writing chunk {}",
                    chunk.chunk_index()
                );
                self.state.set_end_of_input();
                Ok(())
            }
        }
    }

    /// Saves the checkpoint for `chunk` unless the input has ended, then commits it.
    ///
    /// A cancellation observed here leaves the chunk in `uncommitted/`, where the
    /// next start discards it. Once the decision is taken the sequence runs to
    /// the rename, so a committed chunk always has its checkpoint.
    fn commit_chunk(&mut self, chunk: FinishedChunk) -> Result<()> {
        let save_checkpoint = match self.state.commit_requires_checkpoint() {
            Ok(save_checkpoint) => save_checkpoint,
            Err(e) => {
                debug!(
                    "Leaving chunk {} uncommitted after cancellation",
                    chunk.chunk_index
                );
                return Err(e);
            }
        };
        if save_checkpoint {
            self.checkpoints
                .save(&*self.env, &mut self.source, self.chunk_index)?;
        }
        chunk.commit(&*self.env, &self.paths)?;
        self.chunk_index += 1;
        Ok(())
    }

    /// Atomically publishes the `DONE` marker.
    fn write_done_file(&self) -> Result<()> {
        let temp_path = self
            .env
            .temp_file_path(self.paths.stream_directory(), DONE_TEMP_FILE_PREFIX)?;
        let file = self.env.create_file(&temp_path)?;
        self.env.close_file(file)?;
        self.env.rename(&temp_path, &self.paths.done_file_path())?;
        info!(
            "Stream {} done after {} chunks",
            self.paths.stream_directory().display(),
            self.chunk_index
        );
        Ok(())
    }
}

/// Handle to a writer running on a background task.
///
/// Dropping the handle without calling [`wait`](Self::wait) cancels the writer
/// and joins its task.
#[derive(Debug)]
pub struct StreamWriterHandle {
    state: Arc<SharedState>,
    thread: Option<JoinHandle<()>>,
}

impl StreamWriterHandle {
    /// Blocks until the writer finishes and returns its final status.
    ///
    /// Calling it again returns the same status without blocking.
    pub fn wait(&mut self) -> WriterStatus {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Stream writer task panicked");
                self.state.fail(SnapshotError::Internal(
                    "stream writer task panicked".to_string(),
                ));
                return self.state.finish();
            }
        }
        self.state.status()
    }

    /// Asks the writer to stop. Has no effect once the writer reached a terminal phase.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn status(&self) -> WriterStatus {
        self.state.status()
    }

    pub fn phase(&self) -> WriterPhase {
        self.state.phase()
    }

    /// Whether the writer reached a terminal phase.
    pub fn is_finished(&self) -> bool {
        self.state.phase().is_terminal()
    }
}

impl Drop for StreamWriterHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.state.cancel();
            if thread.join().is_err() {
                error!("Stream writer task panicked");
            }
        }
    }
}
