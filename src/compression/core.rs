use bytes::Bytes;

use crate::error::{Result, SnapshotError};

/// Compression applied to every record payload of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    #[default]
    None,
    Zstd,
}

impl CompressionType {
    pub(crate) fn as_byte(&self) -> u8 {
        match self {
            CompressionType::None => 0,
            CompressionType::Zstd => b'z',
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(CompressionType::None),
            b'z' => Ok(CompressionType::Zstd),
            other => Err(SnapshotError::Corruption(format!(
                "Unknown compression type byte: {:#04x}",
                other
            ))),
        }
    }
}

pub(crate) trait Compressor: Send {
    /// Compresses `data`; the result is valid until the next call.
    fn compress<'a>(&'a mut self, data: &'a [u8]) -> Result<&'a [u8]>;
}

pub(crate) trait Decompressor: Send {
    fn decompress(&mut self, compressed_data: Bytes, expected_output_size: usize) -> Result<Bytes>;
}

/// Stores payloads as they are.
struct Uncompressed;

impl Compressor for Uncompressed {
    fn compress<'a>(&'a mut self, data: &'a [u8]) -> Result<&'a [u8]> {
        Ok(data)
    }
}

impl Decompressor for Uncompressed {
    fn decompress(&mut self, compressed_data: Bytes, expected_output_size: usize) -> Result<Bytes> {
        if compressed_data.len() != expected_output_size {
            return Err(SnapshotError::Corruption(format!(
                "Uncompressed record size mismatch: expected {}, got {}",
                expected_output_size,
                compressed_data.len()
            )));
        }
        Ok(compressed_data)
    }
}

pub(crate) fn create_compressor(compression_type: CompressionType) -> Result<Box<dyn Compressor>> {
    match compression_type {
        CompressionType::None => Ok(Box::new(Uncompressed)),
        #[cfg(feature = "zstd")]
        CompressionType::Zstd => Ok(Box::new(super::zstd::ZstdCompressor::with_level(
            crate::constants::DEFAULT_ZSTD_LEVEL,
        )?)),
        #[cfg(not(feature = "zstd"))]
        CompressionType::Zstd => Err(SnapshotError::UnsupportedCompressionType(
            compression_type.as_byte(),
        )),
    }
}

pub(crate) fn create_decompressor(
    compression_type: CompressionType,
) -> Result<Box<dyn Decompressor>> {
    match compression_type {
        CompressionType::None => Ok(Box::new(Uncompressed)),
        #[cfg(feature = "zstd")]
        CompressionType::Zstd => Ok(Box::new(super::zstd::ZstdDecompressor::new()?)),
        #[cfg(not(feature = "zstd"))]
        CompressionType::Zstd => Err(SnapshotError::UnsupportedCompressionType(
            compression_type.as_byte(),
        )),
    }
}
