use crate::model::Ms;

pub const MAX_SUBJECTS: usize = 1_000_000;
pub const MAX_INTERVALS_PER_SUBJECT: usize = 100_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_COMMENT_LEN: usize = 2_048;

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 10000-01-01T00:00:00Z. Open-ended statuses are stored up to 9999-12-31.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_800_000;
