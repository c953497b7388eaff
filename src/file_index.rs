//! Index embedded in chunk and checkpoint filenames.
//!
//! Both kinds of files are named `<prefix>_<index>`, where `<index>` is a
//! non-negative base-10 integer.

use crate::error::{Result, SnapshotError};

/// Formats the filename for `index` with the given prefix.
pub fn file_name(prefix: &str, index: u64) -> String {
    format!("{}_{}", prefix, index)
}

/// Extracts the index from `filename`.
///
/// If `filename` is `<prefix>_<index>` this returns `<index>`. Anything else,
/// including names with a different prefix or trailing characters, fails with
/// [`SnapshotError::MalformedFileName`].
pub fn file_index(filename: &str, prefix: &str) -> Result<u64> {
    let malformed = || SnapshotError::MalformedFileName {
        filename: filename.to_string(),
        prefix: prefix.to_string(),
    };

    let digits = filename
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .ok_or_else(malformed)?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    // Overflowing u64 is as malformed as a non-digit.
    digits.parse::<u64>().map_err(|_| malformed())
}
