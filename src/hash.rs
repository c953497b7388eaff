//! Hashing of record payloads.

use crate::constants::HIGHWAY_HASH_KEY;
use highway::{HighwayHash, HighwayHasher, Key};

/// Calculate the HighwayHash of a record payload as stored on disk.
pub fn highway_hash(data: &[u8]) -> u64 {
    let mut hasher = HighwayHasher::new(Key(HIGHWAY_HASH_KEY));
    hasher.append(data);
    hasher.finalize64()
}
