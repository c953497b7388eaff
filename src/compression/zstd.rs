//! Zstd compression of record payloads.
//!
//! Each record is compressed as an independent frame, so a reader can
//! decompress any record without the ones before it. The compression and
//! decompression contexts live as long as the file they serve.

use bytes::Bytes;
use zstd::bulk;

use crate::compression::core::{Compressor, Decompressor};
use crate::error::{Result, SnapshotError};

/// Compresses records with a context kept for the lifetime of one file.
pub struct ZstdCompressor {
    context: bulk::Compressor<'static>,
    output: Vec<u8>,
}

impl ZstdCompressor {
    /// Level must be within 1..=22.
    pub fn with_level(level: i32) -> Result<Self> {
        if !(1..=22).contains(&level) {
            return Err(SnapshotError::Compression(format!(
                "zstd level {} is outside 1..=22",
                level
            )));
        }
        let context = bulk::Compressor::new(level)
            .map_err(|e| SnapshotError::Compression(format!("Failed to create zstd context: {}", e)))?;

        Ok(Self {
            context,
            output: Vec::new(),
        })
    }
}

impl Compressor for ZstdCompressor {
    fn compress<'a>(&'a mut self, data: &'a [u8]) -> Result<&'a [u8]> {
        self.output.clear();
        self.output.reserve(zstd::zstd_safe::compress_bound(data.len()));
        let written = self
            .context
            .compress_to_buffer(data, &mut self.output)
            .map_err(|e| SnapshotError::Compression(format!("zstd compression failed: {}", e)))?;
        Ok(&self.output[..written])
    }
}

/// Decompresses records whose uncompressed size is known from the record header.
pub struct ZstdDecompressor {
    context: bulk::Decompressor<'static>,
}

impl ZstdDecompressor {
    pub fn new() -> Result<Self> {
        let context = bulk::Decompressor::new()
            .map_err(|e| SnapshotError::Compression(format!("Failed to create zstd context: {}", e)))?;
        Ok(Self { context })
    }
}

impl Decompressor for ZstdDecompressor {
    fn decompress(&mut self, compressed_data: Bytes, expected_output_size: usize) -> Result<Bytes> {
        if expected_output_size == 0 {
            return Ok(Bytes::new());
        }

        let output = self
            .context
            .decompress(&compressed_data, expected_output_size)
            .map_err(|e| SnapshotError::Corruption(format!("zstd decompression failed: {}", e)))?;

        if output.len() != expected_output_size {
            return Err(SnapshotError::Corruption(format!(
                "Record decompressed to {} bytes, header says {}",
                output.len(),
                expected_output_size
            )));
        }
        Ok(Bytes::from(output))
    }
}
