//! Quota Tracker
//!
//! Limits are set per workspace. Usage counters live in the metadata store's
//! ledger and move in the same transaction as every attribution change, so this
//! service only reads them.

use std::sync::Arc;
use vellum_core::constants::clamp_limit;
use vellum_core::models::StorageQuota;
use vellum_core::{AppError, AppResult};
use vellum_db::QuotaStore;

#[derive(Clone)]
pub struct QuotaService {
    quotas: Arc<dyn QuotaStore>,
}

impl QuotaService {
    pub fn new(quotas: Arc<dyn QuotaStore>) -> Self {
        Self { quotas }
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_quota(
        &self,
        workspace_id: &str,
        max_storage_mb: i64,
        max_file_count: i64,
    ) -> AppResult<StorageQuota> {
        if workspace_id.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Workspace id must not be empty".to_string(),
            ));
        }
        if max_storage_mb < 0 || max_file_count < 0 {
            return Err(AppError::InvalidInput(
                "Quota limits must not be negative".to_string(),
            ));
        }

        let quota = self
            .quotas
            .upsert_quota(workspace_id, max_storage_mb, max_file_count)
            .await?;

        tracing::info!(
            workspace_id = %workspace_id,
            max_storage_mb,
            max_file_count,
            used_storage_bytes = quota.used_storage_bytes,
            "Quota set"
        );
        Ok(quota)
    }

    pub async fn get_usage(&self, workspace_id: &str) -> AppResult<StorageQuota> {
        self.quotas
            .get_quota(workspace_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No quota set for workspace {}", workspace_id)))
    }

    pub async fn list_over_quota(&self, limit: Option<i64>) -> AppResult<Vec<StorageQuota>> {
        self.quotas.list_over_quota(clamp_limit(limit)).await
    }

    /// `UsageLimitExceeded` when one more file of `add_bytes` would break the
    /// workspace's limits. Workspaces without a quota are unlimited.
    pub async fn check_headroom(&self, workspace_id: &str, add_bytes: i64) -> AppResult<()> {
        match self.quotas.get_quota(workspace_id).await? {
            Some(quota) => quota.check_headroom(add_bytes),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_db::MemoryStore;

    fn service() -> QuotaService {
        QuotaService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn negative_limits_are_rejected() {
        let quotas = service();
        let err = quotas.set_quota("ws1", -1, 10).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        let err = quotas.set_quota("ws1", 10, -1).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(quotas.get_usage("ws1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn fresh_quota_starts_at_zero() {
        let quota = service().set_quota("ws1", 100, 10).await.unwrap();
        assert_eq!(quota.used_storage_bytes, 0);
        assert_eq!(quota.current_file_count, 0);
        assert_eq!(quota.max_storage_mb, 100);
    }

    #[tokio::test]
    async fn headroom_is_unlimited_without_quota() {
        service().check_headroom("ws-none", i64::MAX / 2).await.unwrap();
    }

    #[tokio::test]
    async fn zero_file_limit_blocks_new_files() {
        let quotas = service();
        quotas.set_quota("ws1", 100, 0).await.unwrap();
        let err = quotas.check_headroom("ws1", 1).await.unwrap_err();
        assert!(matches!(err, AppError::UsageLimitExceeded { .. }));
    }
}
