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

//! Integration tests for writing a stream and reading its committed chunks.
//!
//! These tests only use the public API: records go in through a
//! `StreamWriter` and come back out through `CommittedChunks`.

use std::sync::Arc;

use tempfile::tempdir;

use snapshot_stream::error::Result;
use snapshot_stream::{
    CommittedChunks, CompressionType, LocalEnvironment, StreamWriter, StreamWriterConfig,
    VecRecordSource, WriterPhase,
};

/// Helper function to write `records` as stream 0 of a new snapshot.
fn write_stream<P>(
    snapshot_path: &std::path::Path,
    records: &[P],
    config: StreamWriterConfig,
) -> Result<CommittedChunks>
where
    P: AsRef<[u8]>,
{
    let source = VecRecordSource::from_slices(records);
    let writer = StreamWriter::new(config, Arc::new(LocalEnvironment::new()), source)?;

    let mut handle = writer.start()?;
    let status = handle.wait();
    assert!(status.is_ok(), "writer finished with {:?}", status);
    assert_eq!(handle.phase(), WriterPhase::Completed);

    CommittedChunks::for_stream(snapshot_path, 0)
}

fn read_all(chunks: &CommittedChunks) -> Result<Vec<Vec<u8>>> {
    Ok(chunks
        .read_all_records()?
        .into_iter()
        .map(|record| record.to_vec())
        .collect())
}

#[test]
fn test_simple_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let records = vec![
        b"Record 1".to_vec(),
        b"Record 2 with more data".to_vec(),
        b"Record 3 with even more data for testing".to_vec(),
    ];

    let chunks = write_stream(
        dir.path(),
        &records,
        StreamWriterConfig::new(dir.path(), 0),
    )?;

    // Everything fits in the default chunk size; the one chunk holds it all.
    assert_eq!(chunks.len(), 1);
    assert!(chunks.is_done());
    assert_eq!(read_all(&chunks)?, records);
    Ok(())
}

#[test]
fn test_many_chunks_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let records: Vec<Vec<u8>> = (0..1000)
        .map(|i| format!("record number {}", i).into_bytes())
        .collect();

    let config = StreamWriterConfig::new(dir.path(), 0).with_max_chunk_size_bytes(256);
    let chunks = write_stream(dir.path(), &records, config)?;

    assert!(chunks.len() > 10, "only {} chunks", chunks.len());
    assert_eq!(read_all(&chunks)?, records);

    // Every chunk but the last reached the threshold, and none went past it by
    // more than its final record.
    for index in 0..chunks.len() as u64 - 1 {
        let chunk = chunks.read_chunk(index)?;
        let size: usize = chunk.iter().map(|r| r.len()).sum();
        let last = chunk.last().map_or(0, |r| r.len());
        assert!(size >= 256, "chunk {} has {} bytes", index, size);
        assert!(size - last < 256, "chunk {} has {} bytes", index, size);
    }
    Ok(())
}

#[test]
fn test_empty_and_large_records() -> Result<()> {
    let dir = tempdir()?;
    let records = vec![
        Vec::new(),
        vec![0xAB; 100_000],
        Vec::new(),
        vec![0xCD; 10],
    ];

    let config = StreamWriterConfig::new(dir.path(), 0).with_max_chunk_size_bytes(1024);
    let chunks = write_stream(dir.path(), &records, config)?;

    assert_eq!(read_all(&chunks)?, records);
    assert_eq!(chunks.read_chunk(0)?.len(), 2);
    Ok(())
}

#[cfg(feature = "zstd")]
#[test]
fn test_zstd_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let records: Vec<Vec<u8>> = (0..200)
        .map(|i| format!("compressible record {:04} {}", i, "x".repeat(512)).into_bytes())
        .collect();

    let config = StreamWriterConfig::new(dir.path(), 0)
        .with_max_chunk_size_bytes(4096)
        .with_compression(CompressionType::Zstd);
    let chunks = write_stream(dir.path(), &records, config)?;

    assert_eq!(read_all(&chunks)?, records);

    // Sizes are counted before compression, so the files are smaller than the payload.
    let payload: usize = chunks.read_chunk(0)?.iter().map(|r| r.len()).sum();
    let file_size = std::fs::metadata(&chunks.chunk_paths()[0])?.len() as usize;
    assert!(file_size < payload, "{} >= {}", file_size, payload);
    Ok(())
}

#[test]
fn test_parallel_streams() -> Result<()> {
    let dir = tempdir()?;
    let mut handles = Vec::new();
    for stream_index in 0..4u64 {
        let records: Vec<String> = (0..50)
            .map(|i| format!("stream {} record {}", stream_index, i))
            .collect();
        let config = StreamWriterConfig::new(dir.path(), stream_index).with_max_chunk_size_bytes(100);
        let writer = StreamWriter::new(
            config,
            Arc::new(LocalEnvironment::new()),
            VecRecordSource::from_slices(&records),
        )?;
        handles.push((stream_index, records, writer.start()?));
    }

    for (stream_index, records, mut handle) in handles {
        assert!(handle.wait().is_ok());
        let chunks = CommittedChunks::for_stream(dir.path(), stream_index)?;
        let expected: Vec<Vec<u8>> = records.into_iter().map(String::into_bytes).collect();
        assert_eq!(read_all(&chunks)?, expected);
    }
    Ok(())
}
