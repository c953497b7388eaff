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

//! Reader for record files.

use std::io::{ErrorKind, Read};

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;

use crate::compression::{create_decompressor, CompressionType, Decompressor};
use crate::constants::{FILE_HEADER_SIZE, FILE_SIGNATURE, MAX_RECORD_SIZE_BYTES, RECORD_HEADER_SIZE};
use crate::error::{Result, SnapshotError};
use crate::hash::highway_hash;

/// Reads records back from a record file, verifying each payload hash.
pub struct RecordFileReader<Source: Read> {
    source: Source,

    decompressor: Box<dyn Decompressor>,

    compression_type: CompressionType,

    /// Number of records returned so far.
    records_read: u64,

    /// Set once the end of the file or an error was reached.
    finished: bool,
}

impl<Source: Read> RecordFileReader<Source> {
    /// Creates a reader, verifying the file header.
    pub fn new(mut source: Source) -> Result<Self> {
        let mut header = [0u8; FILE_HEADER_SIZE];
        let filled = read_up_to(&mut source, &mut header)?;
        if filled < FILE_HEADER_SIZE {
            return Err(SnapshotError::InvalidFileSignature(format!(
                "file is {} bytes, shorter than the {} byte header",
                filled, FILE_HEADER_SIZE
            )));
        }
        if header[..FILE_SIGNATURE.len()] != FILE_SIGNATURE {
            return Err(SnapshotError::InvalidFileSignature(
                "signature bytes do not match".to_string(),
            ));
        }

        let compression_type = CompressionType::from_byte(header[FILE_SIGNATURE.len()])?;
        let decompressor = create_decompressor(compression_type)?;

        Ok(Self {
            source,
            decompressor,
            compression_type,
            records_read: 0,
            finished: false,
        })
    }

    /// Reads the next record, or `None` at a clean end of file.
    pub fn read_record(&mut self) -> Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }

        let mut header = [0u8; RECORD_HEADER_SIZE];
        let filled = read_up_to(&mut self.source, &mut header)?;
        if filled == 0 {
            self.finished = true;
            return Ok(None);
        }
        if filled < RECORD_HEADER_SIZE {
            return Err(self.corruption(format!(
                "truncated record header ({} of {} bytes)",
                filled, RECORD_HEADER_SIZE
            )));
        }

        let stored_len = LittleEndian::read_u64(&header[0..8]);
        let decompressed_len = LittleEndian::read_u64(&header[8..16]);
        let expected_hash = LittleEndian::read_u64(&header[16..24]);

        if stored_len > MAX_RECORD_SIZE_BYTES || decompressed_len > MAX_RECORD_SIZE_BYTES {
            return Err(self.corruption(format!(
                "record size {} / {} exceeds the {} byte limit",
                stored_len, decompressed_len, MAX_RECORD_SIZE_BYTES
            )));
        }

        let mut stored = vec![0u8; stored_len as usize];
        let filled = read_up_to(&mut self.source, &mut stored)?;
        if filled < stored.len() {
            return Err(self.corruption(format!(
                "truncated record payload ({} of {} bytes)",
                filled, stored_len
            )));
        }

        if highway_hash(&stored) != expected_hash {
            return Err(self.corruption("record hash mismatch".to_string()));
        }

        let record = self
            .decompressor
            .decompress(Bytes::from(stored), decompressed_len as usize)?;
        self.records_read += 1;
        Ok(Some(record))
    }

    /// Reads every remaining record.
    pub fn read_all(mut self) -> Result<Vec<Bytes>> {
        let mut records = Vec::new();
        while let Some(record) = self.read_record()? {
            records.push(record);
        }
        Ok(records)
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    pub fn compression_type(&self) -> CompressionType {
        self.compression_type
    }

    fn corruption(&mut self, message: String) -> SnapshotError {
        self.finished = true;
        SnapshotError::Corruption(format!("record {}: {}", self.records_read, message))
    }
}

impl<Source: Read> Iterator for RecordFileReader<Source> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.read_record();
        if result.is_err() {
            self.finished = true;
        }
        result.transpose()
    }
}

/// Fills `buf` as far as the source allows, returning the number of bytes read.
fn read_up_to<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(SnapshotError::Io(e)),
        }
    }
    Ok(filled)
}
