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

//! Startup recovery: restoring the source and reconciling uncommitted chunks.
//!
//! A writer may stop at any point of the checkpoint-then-commit sequence. On the
//! next start the latest checkpoint `k` decides the fate of every file left in
//! `uncommitted/`:
//!
//! - `chunk_<i>` with `i <= k` was fully written before the checkpoint was
//!   saved, only its rename was lost. It is committed now.
//! - `chunk_<i>` with `i > k` was written after the last checkpoint and may be
//!   incomplete. It is deleted and regenerated from the restored source.
//!
//! Without any checkpoint every uncommitted chunk is deleted.

use log::{info, warn};

use crate::checkpoint::CheckpointManager;
use crate::constants::CHUNK_FILE_PREFIX;
use crate::env::Environment;
use crate::error::{Result, SnapshotError};
use crate::file_index::file_index;
use crate::paths::StreamPaths;
use crate::source::RecordSource;

/// What recovery found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryOutcome {
    /// Index of the checkpoint the source was restored from, if any.
    pub checkpoint_index: Option<u64>,

    /// Index of the next chunk to write.
    pub next_chunk_index: u64,

    /// Uncommitted chunks that were renamed into `committed/`, ascending.
    pub promoted_chunks: Vec<u64>,

    /// Uncommitted chunks that were deleted, ascending.
    pub discarded_chunks: Vec<u64>,
}

/// Brings a stream's directories back to a state the writer can resume from.
pub struct RecoveryCoordinator<'a, E: Environment> {
    env: &'a E,
    paths: &'a StreamPaths,
    checkpoints: &'a CheckpointManager,
}

impl<'a, E: Environment> RecoveryCoordinator<'a, E> {
    pub fn new(env: &'a E, paths: &'a StreamPaths, checkpoints: &'a CheckpointManager) -> Self {
        Self {
            env,
            paths,
            checkpoints,
        }
    }

    /// Restores `source` from the latest checkpoint and reconciles `uncommitted/`.
    ///
    /// A stream without checkpoints is a fresh stream: the source keeps its
    /// initial state and writing starts at chunk 0.
    pub fn restore<S: RecordSource>(&self, source: &mut S) -> Result<RecoveryOutcome> {
        let checkpoint_index = match self.checkpoints.restore(self.env, source) {
            Ok(index) => Some(index),
            Err(SnapshotError::NotFound(message)) => {
                info!("{}; starting a fresh stream", message);
                None
            }
            Err(e) => return Err(e),
        };

        // A save interrupted before its pruning leaves the previous checkpoint behind.
        if let Some(index) = checkpoint_index {
            self.checkpoints.delete_outdated_checkpoints(self.env, index)?;
        }
        self.checkpoints.remove_temp_files(self.env)?;
        let mut outcome = self.reconcile(checkpoint_index)?;
        outcome.next_chunk_index = checkpoint_index.map_or(0, |index| index + 1);
        Ok(outcome)
    }

    /// Commits uncommitted chunks covered by `checkpoint_index` and deletes the rest.
    pub fn reconcile(&self, checkpoint_index: Option<u64>) -> Result<RecoveryOutcome> {
        let uncommitted_directory = self.paths.uncommitted_chunks_directory();

        // Parse every name before touching anything, so a stray file fails
        // recovery without a half-reconciled directory.
        let mut chunks = Vec::new();
        for chunk_name in self.env.list_children(uncommitted_directory)? {
            let chunk_index = file_index(&chunk_name, CHUNK_FILE_PREFIX)?;
            chunks.push((chunk_index, chunk_name));
        }
        chunks.sort_unstable();

        let mut outcome = RecoveryOutcome {
            checkpoint_index,
            ..Default::default()
        };

        for (chunk_index, chunk_name) in chunks {
            let uncommitted_path = uncommitted_directory.join(&chunk_name);
            if checkpoint_index.is_some_and(|checkpoint| chunk_index <= checkpoint) {
                let committed_path = self.paths.committed_chunks_directory().join(&chunk_name);
                if self.env.file_exists(&committed_path)? {
                    return Err(SnapshotError::Internal(format!(
                        "Chunk {} exists in both {} and {}",
                        chunk_index,
                        uncommitted_path.display(),
                        committed_path.display()
                    )));
                }
                self.env.rename(&uncommitted_path, &committed_path)?;
                info!("Committed chunk {} during recovery", chunk_index);
                outcome.promoted_chunks.push(chunk_index);
            } else {
                self.env.delete_file(&uncommitted_path)?;
                warn!(
                    "Discarded uncommitted chunk {} written after the last checkpoint",
                    chunk_index
                );
                outcome.discarded_chunks.push(chunk_index);
            }
        }

        Ok(outcome)
    }
}
