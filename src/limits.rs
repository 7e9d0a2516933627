use crate::model::Ms;

/// Earliest accepted timestamp (1970-01-01).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// Latest accepted timestamp (9999-12-31T23:59:59.999Z).
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

pub const MAX_RESOURCE_NAME_LEN: usize = 256;
pub const MAX_REQUESTER_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 4096;

pub const MAX_RESOURCES: usize = 10_000;

/// Longest accepted request line on the wire.
pub const MAX_LINE_LEN: usize = 64 * 1024;
