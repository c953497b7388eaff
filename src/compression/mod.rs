//! Per-record compression for chunk and checkpoint files.

pub(crate) mod core;

#[cfg(feature = "zstd")]
pub(crate) mod zstd;


pub use self::core::CompressionType;
pub(crate) use self::core::{create_compressor, create_decompressor, Compressor, Decompressor};
