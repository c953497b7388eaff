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

//! Crash-recoverable, chunked stream writer.
//!
//! A [`StreamWriter`](stream_writer::StreamWriter) pulls records from a
//! [`RecordSource`](source::RecordSource) and persists them as a sequence of immutable
//! chunk files. Before each chunk is committed the source's progress is checkpointed,
//! so a writer restarted after a crash resumes without losing data and without
//! publishing a chunk twice.
//!
//! Every stream lives under `<snapshot_path>/streams/<stream_index>/`:
//!
//! ```text
//! committed/      chunk_<i>         complete chunks, read by consumers
//! uncommitted/    chunk_<i>         the chunk currently being filled
//! checkpoints/    checkpoint_<i>    resumption state attesting chunks 0..=i
//! ```

pub mod checkpoint;
pub mod chunk_writer;
pub mod committed;
pub mod compression;
pub mod constants;
pub mod env;
pub mod error;
pub mod file_index;
pub mod hash;
pub mod paths;
pub mod records;
pub mod recovery;
pub mod source;
pub mod stream_writer;

#[cfg(test)]
mod tests;

pub use committed::CommittedChunks;
pub use compression::CompressionType;
pub use env::{Environment, LocalEnvironment};
pub use error::{Result, SnapshotError};
pub use source::{RecordSource, SourcePiece, VecRecordSource};
pub use stream_writer::{
    StreamWriter, StreamWriterConfig, StreamWriterHandle, WriterPhase, WriterStatus,
};
