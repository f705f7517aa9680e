//! Shared key generation for storage backends.
//!
//! Key format: `media/{owner}/{media_id}/current/{filename}` for current content and
//! `media/{owner}/{media_id}/versions/{n}/{filename}` for version content. The two
//! kinds live under separate fixed directories, so no filename can shadow a
//! version directory on a filesystem backend.

use std::borrow::Cow;

use uuid::Uuid;
use vellum_core::constants::MEDIA_KEY_PREFIX;

use crate::traits::{StorageError, StorageResult};

const CURRENT_DIR: &str = "current";
const VERSIONS_DIR: &str = "versions";

/// Percent-encode one key segment.
///
/// `urlencoding` leaves unreserved characters untouched, so the segments that would
/// read as path navigation (and the empty segment) are spelled with escapes of
/// unreserved characters. The encoder never emits those escapes itself, which keeps
/// the encoding injective.
fn encode_segment(segment: &str) -> Cow<'_, str> {
    match segment {
        "." => Cow::Borrowed("%2E"),
        ".." => Cow::Borrowed("%2E%2E"),
        "" => Cow::Borrowed("%2D"),
        other => urlencoding::encode(other),
    }
}

/// Derive the blob key for a media object or, when `version` is set, one of its versions.
///
/// Deterministic and injective over `(owner_id, media_id, version, filename)`.
pub fn blob_key(owner_id: &str, media_id: Uuid, version: Option<i32>, filename: &str) -> String {
    let owner = encode_segment(owner_id);
    let filename = encode_segment(filename);
    match version {
        Some(n) => format!(
            "{}/{}/{}/{}/{}/{}",
            MEDIA_KEY_PREFIX, owner, media_id, VERSIONS_DIR, n, filename
        ),
        None => format!(
            "{}/{}/{}/{}/{}",
            MEDIA_KEY_PREFIX, owner, media_id, CURRENT_DIR, filename
        ),
    }
}

/// Reject keys that could escape a backend's root: empty keys, absolute keys,
/// empty or dot-only components, backslashes and NUL bytes.
pub fn validate_key(storage_key: &str) -> StorageResult<()> {
    if storage_key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if storage_key.starts_with('/') || storage_key.contains('\\') || storage_key.contains('\0') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    if storage_key
        .split('/')
        .any(|component| component.is_empty() || component == "." || component == "..")
    {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid path components".to_string(),
        ));
    }
    Ok(())
}
