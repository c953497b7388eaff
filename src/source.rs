//! Record sources feeding a stream writer.

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;

use crate::error::{Result, SnapshotError};

/// A piece produced by a [`RecordSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePiece {
    /// The next record of the stream.
    Record(Bytes),

    /// The source is exhausted. It keeps returning this on further calls.
    EndOfInput,
}

/// An ordered source of records that can save and restore its position.
///
/// The writer checkpoints `save_state` before each chunk commit and hands the
/// saved blob back to `restore_state` after a restart. Records produced after a
/// restore must be the same records the source produced after the matching save,
/// otherwise regenerated chunks will differ from the discarded ones.
///
/// Errors should be reported through [`SnapshotError::source_error`]; the writer
/// surfaces them unchanged as its terminal status.
pub trait RecordSource: Send + 'static {
    /// Produces the next record or reports the end of input.
    fn next_record(&mut self) -> Result<SourcePiece>;

    /// Serializes the current position.
    fn save_state(&mut self) -> Result<Bytes>;

    /// Resumes from a blob produced by `save_state`.
    fn restore_state(&mut self, state: Bytes) -> Result<()>;
}

/// A [`RecordSource`] over an in-memory list of records.
///
/// The saved state is the position of the next record as a little-endian u64.
#[derive(Debug, Clone)]
pub struct VecRecordSource {
    records: Vec<Bytes>,
    position: usize,
}

impl VecRecordSource {
    pub fn new(records: Vec<Bytes>) -> Self {
        Self {
            records,
            position: 0,
        }
    }

    /// Builds a source from anything byte-like, copying each record.
    pub fn from_slices<P: AsRef<[u8]>>(records: &[P]) -> Self {
        Self::new(
            records
                .iter()
                .map(|r| Bytes::copy_from_slice(r.as_ref()))
                .collect(),
        )
    }

    /// Index of the next record to be produced.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Encodes a position the way `save_state` does.
    pub fn encode_state(position: usize) -> Bytes {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, position as u64);
        Bytes::copy_from_slice(&buf)
    }
}

impl RecordSource for VecRecordSource {
    fn next_record(&mut self) -> Result<SourcePiece> {
        match self.records.get(self.position) {
            Some(record) => {
                self.position += 1;
                Ok(SourcePiece::Record(record.clone()))
            }
            None => Ok(SourcePiece::EndOfInput),
        }
    }

    fn save_state(&mut self) -> Result<Bytes> {
        Ok(Self::encode_state(self.position))
    }

    fn restore_state(&mut self, state: Bytes) -> Result<()> {
        if state.len() != 8 {
            return Err(SnapshotError::source_error(format!(
                "malformed source state: expected 8 bytes, got {}",
                state.len()
            )));
        }
        let position = LittleEndian::read_u64(&state) as usize;
        if position > self.records.len() {
            return Err(SnapshotError::source_error(format!(
                "source state position {} is past the {} available records",
                position,
                self.records.len()
            )));
        }
        self.position = position;
        Ok(())
    }
}
