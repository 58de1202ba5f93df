use crate::model::{DAY, Ms};

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Widest span a single appointment or blocked slot may cover.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * DAY;
/// Widest window accepted by listing and availability queries.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * DAY;

pub const MAX_ACTIVITIES_PER_APPOINTMENT: usize = 64;
pub const MAX_ENTRIES_PER_PROVIDER: usize = 100_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_REASON_LEN: usize = 1024;
