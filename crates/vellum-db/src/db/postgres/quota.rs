use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;
use vellum_core::models::StorageQuota;
use vellum_core::AppError;

use super::rows::QuotaRow;
use crate::db::traits::QuotaStore;

/// Limits joined with the usage ledger. A workspace with no usage row reads as zero.
const QUOTA_SELECT: &str = r#"
    SELECT q.id, q.workspace_id, q.max_storage_mb,
           COALESCE(u.used_storage_bytes, 0) AS used_storage_bytes,
           q.max_file_count,
           COALESCE(u.current_file_count, 0) AS current_file_count,
           q.created_at, q.updated_at
    FROM storage_quotas q
    LEFT JOIN workspace_usage u ON u.workspace_id = q.workspace_id
"#;

#[derive(Clone)]
pub struct QuotaRepository {
    pool: PgPool,
}

impl QuotaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaStore for QuotaRepository {
    #[tracing::instrument(skip(self), fields(db.table = "storage_quotas", db.operation = "upsert"))]
    async fn upsert_quota(
        &self,
        workspace_id: &str,
        max_storage_mb: i64,
        max_file_count: i64,
    ) -> Result<StorageQuota, AppError> {
        let row = sqlx::query_as::<Postgres, QuotaRow>(
            r#"
            WITH q AS (
                INSERT INTO storage_quotas (id, workspace_id, max_storage_mb, max_file_count, created_at, updated_at)
                VALUES ($1, $2, $3, $4, NOW(), NOW())
                ON CONFLICT (workspace_id) DO UPDATE SET
                    max_storage_mb = EXCLUDED.max_storage_mb,
                    max_file_count = EXCLUDED.max_file_count,
                    updated_at = NOW()
                RETURNING id, workspace_id, max_storage_mb, max_file_count, created_at, updated_at
            )
            SELECT q.id, q.workspace_id, q.max_storage_mb,
                   COALESCE(u.used_storage_bytes, 0) AS used_storage_bytes,
                   q.max_file_count,
                   COALESCE(u.current_file_count, 0) AS current_file_count,
                   q.created_at, q.updated_at
            FROM q
            LEFT JOIN workspace_usage u ON u.workspace_id = q.workspace_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(max_storage_mb)
        .bind(max_file_count)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_quota())
    }

    #[tracing::instrument(skip(self), fields(db.table = "storage_quotas", db.operation = "select"))]
    async fn get_quota(&self, workspace_id: &str) -> Result<Option<StorageQuota>, AppError> {
        let row = sqlx::query_as::<Postgres, QuotaRow>(&format!(
            "{} WHERE q.workspace_id = $1",
            QUOTA_SELECT
        ))
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(QuotaRow::into_quota))
    }

    #[tracing::instrument(skip(self), fields(db.table = "storage_quotas", db.operation = "select"))]
    async fn list_over_quota(&self, limit: i64) -> Result<Vec<StorageQuota>, AppError> {
        let rows = sqlx::query_as::<Postgres, QuotaRow>(&format!(
            r#"{}
            WHERE COALESCE(u.used_storage_bytes, 0) > q.max_storage_mb * 1048576
               OR COALESCE(u.current_file_count, 0) > q.max_file_count
            ORDER BY q.workspace_id
            LIMIT $1"#,
            QUOTA_SELECT
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(QuotaRow::into_quota).collect())
    }
}
