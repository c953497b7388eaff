//! Record file format shared by chunk and checkpoint files.
//!
//! A record file starts with an 8-byte signature followed by one byte naming the
//! compression applied to every record. Each record is then stored as:
//!
//! ```text
//! [stored length: u64 LE][decompressed length: u64 LE][HighwayHash of stored bytes: u64 LE][stored bytes]
//! ```
//!
//! Records are written in order and a file is only ever appended to while it is
//! open. Readers detect truncation and bit flips and report them as
//! [`SnapshotError::Corruption`](crate::error::SnapshotError::Corruption).

pub mod reader;
pub mod writer;


pub use reader::RecordFileReader;
pub use writer::RecordFileWriter;
