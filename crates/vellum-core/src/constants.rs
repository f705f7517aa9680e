//! Shared constants.

/// Root prefix of every blob key.
pub const MEDIA_KEY_PREFIX: &str = "media";

/// Cache key namespace for media records.
pub const MEDIA_CACHE_PREFIX: &str = "media:";

/// Default page size for list operations when the caller passes none.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Upper bound on any list page.
pub const MAX_LIST_LIMIT: i64 = 1000;

/// Clamp a caller-supplied limit into `1..=MAX_LIST_LIMIT`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}
