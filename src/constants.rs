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

//! Constants shared by the stream layout and the record file format.

/// Directory under the snapshot path holding one subdirectory per stream.
pub const STREAMS_DIRECTORY: &str = "streams";

/// Directory of chunks visible to consumers.
pub const COMMITTED_CHUNKS_DIRECTORY: &str = "committed";

/// Directory of chunks that are being written or await reconciliation.
pub const UNCOMMITTED_CHUNKS_DIRECTORY: &str = "uncommitted";

/// Directory of checkpoint files.
pub const CHECKPOINTS_DIRECTORY: &str = "checkpoints";

/// Filename prefix of chunk files (`chunk_<index>`).
pub const CHUNK_FILE_PREFIX: &str = "chunk";

/// Filename prefix of checkpoint files (`checkpoint_<index>`).
pub const CHECKPOINT_FILE_PREFIX: &str = "checkpoint";

/// Prefix of temporary files allocated while a checkpoint is being written.
pub const CHECKPOINT_TEMP_FILE_PREFIX: &str = ".checkpoint_tmp";

/// Prefix of temporary files allocated while the done marker is being written.
pub const DONE_TEMP_FILE_PREFIX: &str = ".done_tmp";

/// Marker written into the stream directory once every chunk is committed.
pub const DONE_FILE_NAME: &str = "DONE";

/// Default chunk size threshold (2 GiB).
pub const DEFAULT_MAX_CHUNK_SIZE_BYTES: u64 = 2 * (1 << 30);

/// Magic bytes at the start of every record file.
pub const FILE_SIGNATURE: [u8; 8] = *b"SNAPSTRM";

/// Size of the file header: signature followed by the compression byte.
pub const FILE_HEADER_SIZE: usize = FILE_SIGNATURE.len() + 1;

/// Size of a record header: stored length, decompressed length and payload hash.
pub const RECORD_HEADER_SIZE: usize = 24;

/// Largest record payload accepted by the reader.
pub const MAX_RECORD_SIZE_BYTES: u64 = 1 << 31;

/// Compression level used when zstd is selected.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// The HighwayHash key used for record payloads.
/// This is 'Snapshot', '/stream\n', 'Snapshot', '/stream\n' in 64-bit chunks.
pub const HIGHWAY_HASH_KEY: [u64; 4] = [
    0x746f687370616e53,
    0x0a6d61657274732f,
    0x746f687370616e53,
    0x0a6d61657274732f,
];
