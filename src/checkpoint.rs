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

//! Checkpoints of record source progress.
//!
//! A checkpoint named `checkpoint_<i>` holds exactly one record: the state blob
//! of the source taken right after chunk `i` was fully written and right before
//! it was committed. It attests that chunks `0..=i` are committed or can be
//! committed by reconciliation. Only the newest checkpoint is kept.

use std::path::PathBuf;

use bytes::Bytes;
use log::{debug, info, warn};

use crate::compression::CompressionType;
use crate::constants::{CHECKPOINT_FILE_PREFIX, CHECKPOINT_TEMP_FILE_PREFIX, DONE_TEMP_FILE_PREFIX};
use crate::env::Environment;
use crate::error::{Result, SnapshotError};
use crate::file_index::file_index;
use crate::paths::StreamPaths;
use crate::records::{RecordFileReader, RecordFileWriter};
use crate::source::RecordSource;

/// Writes, prunes and loads the checkpoints of one stream.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    paths: StreamPaths,
    compression_type: CompressionType,
}

impl CheckpointManager {
    pub fn new(paths: StreamPaths, compression_type: CompressionType) -> Self {
        Self {
            paths,
            compression_type,
        }
    }

    /// Saves the source's current state as `checkpoint_<chunk_index>` and deletes
    /// every older checkpoint.
    ///
    /// The state is written to a temporary file in the stream directory first and
    /// renamed into `checkpoints/`, so a checkpoint file is either complete or absent.
    pub fn save<E: Environment, S: RecordSource>(
        &self,
        env: &E,
        source: &mut S,
        chunk_index: u64,
    ) -> Result<()> {
        let state = source.save_state()?;
        let temp_path =
            env.temp_file_path(self.paths.stream_directory(), CHECKPOINT_TEMP_FILE_PREFIX)?;

        let mut writer = RecordFileWriter::new(env.create_file(&temp_path)?, self.compression_type)?;
        writer.write_record(&state)?;
        writer.close()?;
        env.close_file(writer.into_inner())?;

        let checkpoint_path = self.paths.checkpoint_path(chunk_index);
        env.rename(&temp_path, &checkpoint_path)?;
        debug!(
            "Saved checkpoint {} ({} state bytes)",
            checkpoint_path.display(),
            state.len()
        );

        self.delete_outdated_checkpoints(env, chunk_index)
    }

    /// Deletes every checkpoint whose index is below `chunk_index`.
    pub fn delete_outdated_checkpoints<E: Environment>(&self, env: &E, chunk_index: u64) -> Result<()> {
        let checkpoints_directory = self.paths.checkpoints_directory();
        for checkpoint_name in env.list_children(checkpoints_directory)? {
            let checkpoint_index = file_index(&checkpoint_name, CHECKPOINT_FILE_PREFIX)?;
            if checkpoint_index < chunk_index {
                env.delete_file(&checkpoints_directory.join(&checkpoint_name))?;
                debug!("Deleted outdated checkpoint {}", checkpoint_name);
            }
        }
        Ok(())
    }

    /// Returns the highest checkpoint index present.
    ///
    /// Fails with [`SnapshotError::NotFound`] if no checkpoint has been written and
    /// with [`SnapshotError::MalformedFileName`] if any entry is not a checkpoint.
    pub fn last_checkpoint_index<E: Environment>(&self, env: &E) -> Result<u64> {
        let checkpoints_directory = self.paths.checkpoints_directory();
        let checkpoint_names = env.list_children(checkpoints_directory)?;
        if checkpoint_names.is_empty() {
            return Err(SnapshotError::NotFound(format!(
                "No checkpoint has been written in directory {}",
                checkpoints_directory.display()
            )));
        }

        let mut last_index = 0;
        for checkpoint_name in &checkpoint_names {
            last_index = last_index.max(file_index(checkpoint_name, CHECKPOINT_FILE_PREFIX)?);
        }
        Ok(last_index)
    }

    /// Reads the state blob stored in `checkpoint_<checkpoint_index>`.
    pub fn read_checkpoint<E: Environment>(&self, env: &E, checkpoint_index: u64) -> Result<Bytes> {
        let checkpoint_path = self.paths.checkpoint_path(checkpoint_index);
        let mut reader = RecordFileReader::new(env.open_file(&checkpoint_path)?)?;

        let mut states = Vec::with_capacity(1);
        while let Some(state) = reader.read_record()? {
            states.push(state);
        }
        if states.len() != 1 {
            return Err(SnapshotError::Internal(format!(
                "A snapshot checkpoint file is expected to contain 1 state. Got {} states from checkpoint file: {}",
                states.len(),
                checkpoint_path.display()
            )));
        }
        Ok(states.swap_remove(0))
    }

    /// Restores `source` from the latest checkpoint and returns that checkpoint's index.
    ///
    /// Fails with [`SnapshotError::NotFound`] when the stream has no checkpoint.
    pub fn restore<E: Environment, S: RecordSource>(&self, env: &E, source: &mut S) -> Result<u64> {
        let checkpoint_index = self.last_checkpoint_index(env)?;
        let state = self.read_checkpoint(env, checkpoint_index)?;
        source.restore_state(state)?;
        info!(
            "Restored source from checkpoint {} in {}",
            checkpoint_index,
            self.paths.checkpoints_directory().display()
        );
        Ok(checkpoint_index)
    }

    /// Deletes temporary files left behind by checkpoint saves or `DONE` writes
    /// that were interrupted before their rename. Returns how many were removed.
    pub fn remove_temp_files<E: Environment>(&self, env: &E) -> Result<usize> {
        let stream_directory = self.paths.stream_directory();
        let stale: Vec<PathBuf> = env
            .list_children(stream_directory)?
            .into_iter()
            .filter(|name| {
                name.starts_with(CHECKPOINT_TEMP_FILE_PREFIX) || name.starts_with(DONE_TEMP_FILE_PREFIX)
            })
            .map(|name| stream_directory.join(name))
            .collect();

        for path in &stale {
            warn!("Removing interrupted write {}", path.display());
            env.delete_file(path)?;
        }
        Ok(stale.len())
    }
}
