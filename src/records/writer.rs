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

//! Writer for record files.

use std::io::Write;

use byteorder::{ByteOrder, LittleEndian};

use crate::compression::{create_compressor, CompressionType, Compressor};
use crate::constants::{FILE_SIGNATURE, RECORD_HEADER_SIZE};
use crate::error::{Result, SnapshotError};
use crate::hash::highway_hash;

/// State of a RecordFileWriter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriterState {
    /// The header has been written and records may be appended.
    Open,

    /// The sink has been flushed; no more records are accepted.
    Closed,
}

/// Appends records to a sink in the record file format.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use snapshot_stream::compression::CompressionType;
/// use snapshot_stream::records::{RecordFileReader, RecordFileWriter};
///
/// let mut writer = RecordFileWriter::new(Vec::new(), CompressionType::None).unwrap();
/// writer.write_record(b"first").unwrap();
/// writer.write_record(b"second").unwrap();
/// writer.close().unwrap();
///
/// let reader = RecordFileReader::new(Cursor::new(writer.into_inner())).unwrap();
/// assert_eq!(reader.read_all().unwrap().len(), 2);
/// ```
pub struct RecordFileWriter<Sink: Write> {
    sink: Sink,

    compressor: Box<dyn Compressor>,

    compression_type: CompressionType,

    state: WriterState,

    /// Number of records appended so far.
    records_written: u64,

    /// Sum of the uncompressed payload sizes appended so far.
    payload_bytes_written: u64,
}

impl<Sink: Write> RecordFileWriter<Sink> {
    /// Creates a writer and immediately writes the file header.
    pub fn new(mut sink: Sink, compression_type: CompressionType) -> Result<Self> {
        let compressor = create_compressor(compression_type)?;

        sink.write_all(&FILE_SIGNATURE)?;
        sink.write_all(&[compression_type.as_byte()])?;

        Ok(Self {
            sink,
            compressor,
            compression_type,
            state: WriterState::Open,
            records_written: 0,
            payload_bytes_written: 0,
        })
    }

    /// Appends one record.
    ///
    /// Returns the estimated serialized size of the record, which is the length
    /// of its uncompressed payload.
    pub fn write_record(&mut self, record: &[u8]) -> Result<u64> {
        if self.state == WriterState::Closed {
            return Err(SnapshotError::WritingClosedFile);
        }

        let stored = self.compressor.compress(record)?;

        let mut header = [0u8; RECORD_HEADER_SIZE];
        LittleEndian::write_u64(&mut header[0..8], stored.len() as u64);
        LittleEndian::write_u64(&mut header[8..16], record.len() as u64);
        LittleEndian::write_u64(&mut header[16..24], highway_hash(stored));

        self.sink.write_all(&header)?;
        self.sink.write_all(stored)?;

        let estimated_size = record.len() as u64;
        self.records_written += 1;
        self.payload_bytes_written += estimated_size;
        Ok(estimated_size)
    }

    /// Flushes buffered data and stops accepting records. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == WriterState::Closed {
            return Ok(());
        }
        self.sink.flush()?;
        self.state = WriterState::Closed;
        Ok(())
    }

    /// Returns the underlying sink.
    pub fn into_inner(self) -> Sink {
        self.sink
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn payload_bytes_written(&self) -> u64 {
        self.payload_bytes_written
    }

    pub fn compression_type(&self) -> CompressionType {
        self.compression_type
    }
}
