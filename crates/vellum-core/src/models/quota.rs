use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

const BYTES_PER_MB: i64 = 1024 * 1024;

/// Storage quota for one workspace.
///
/// `used_storage_bytes` and `current_file_count` are maintained by the metadata
/// store in the same transaction as every mutation that changes attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StorageQuota {
    pub id: Uuid,
    pub workspace_id: String,
    pub max_storage_mb: i64,
    pub used_storage_bytes: i64,
    pub max_file_count: i64,
    pub current_file_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StorageQuota {
    /// Used storage in megabytes, rounded up.
    pub fn used_storage_mb(&self) -> i64 {
        if self.used_storage_bytes <= 0 {
            return 0;
        }
        (self.used_storage_bytes + BYTES_PER_MB - 1) / BYTES_PER_MB
    }

    pub fn max_storage_bytes(&self) -> i64 {
        self.max_storage_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn is_over_quota(&self) -> bool {
        self.used_storage_bytes > self.max_storage_bytes()
            || self.current_file_count > self.max_file_count
    }

    /// Fails with `UsageLimitExceeded` if one more file of `add_bytes` would break a limit.
    pub fn check_headroom(&self, add_bytes: i64) -> Result<(), AppError> {
        let files_after = self.current_file_count.saturating_add(1);
        if files_after > self.max_file_count {
            return Err(AppError::UsageLimitExceeded {
                resource: "files".to_string(),
                used: files_after,
                limit: self.max_file_count,
            });
        }

        let bytes_after = self.used_storage_bytes.saturating_add(add_bytes);
        if bytes_after > self.max_storage_bytes() {
            return Err(AppError::UsageLimitExceeded {
                resource: "storage_bytes".to_string(),
                used: bytes_after,
                limit: self.max_storage_bytes(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(max_mb: i64, used_bytes: i64, max_files: i64, files: i64) -> StorageQuota {
        let now = Utc::now();
        StorageQuota {
            id: Uuid::new_v4(),
            workspace_id: "ws1".to_string(),
            max_storage_mb: max_mb,
            used_storage_bytes: used_bytes,
            max_file_count: max_files,
            current_file_count: files,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn used_mb_rounds_up() {
        assert_eq!(quota(10, 0, 10, 0).used_storage_mb(), 0);
        assert_eq!(quota(10, 1, 10, 1).used_storage_mb(), 1);
        assert_eq!(quota(10, BYTES_PER_MB, 10, 1).used_storage_mb(), 1);
        assert_eq!(quota(10, BYTES_PER_MB + 1, 10, 1).used_storage_mb(), 2);
    }

    #[test]
    fn over_quota_on_either_dimension() {
        assert!(!quota(1, BYTES_PER_MB, 2, 2).is_over_quota());
        assert!(quota(1, BYTES_PER_MB + 1, 2, 0).is_over_quota());
        assert!(quota(100, 0, 2, 3).is_over_quota());
    }

    #[test]
    fn headroom_rejects_file_that_would_exceed() {
        let q = quota(1, BYTES_PER_MB - 10, 5, 0);
        assert!(q.check_headroom(10).is_ok());
        assert!(matches!(
            q.check_headroom(11),
            Err(AppError::UsageLimitExceeded { .. })
        ));
        let full = quota(100, 0, 1, 1);
        assert!(full.check_headroom(0).is_err());
    }
}
