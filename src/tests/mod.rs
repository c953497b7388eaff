//! Tests for the stream writer protocol.

pub(crate) mod utils;
