use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;
use vellum_core::models::{CategoryStats, MediaCategory, MediaPatch, MediaRecord, MediaStats};
use vellum_core::AppError;

use super::ledger::{adjust_usage, claim_blob, conflict_on_unique, release_blob};
use super::rows::{MediaRow, MEDIA_COLUMNS};
use crate::db::traits::{BlobClaim, BlobRelease, MediaStore, MediaUpdate};

#[derive(Clone)]
pub struct MediaRepository {
    pool: PgPool,
}

impl MediaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaStore for MediaRepository {
    #[tracing::instrument(skip(self, record), fields(db.table = "media", db.operation = "insert", db.record_id = %record.id))]
    async fn insert_media(&self, record: &MediaRecord, claim: BlobClaim) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO media (id, owner_id, workspace_id, category, filename, mime_type,
                               size_bytes, blob_key, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(&record.owner_id)
        .bind(&record.workspace_id)
        .bind(record.category)
        .bind(&record.filename)
        .bind(&record.mime_type)
        .bind(record.size_bytes)
        .bind(&record.blob_key)
        .bind(sqlx::types::Json(&record.metadata))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "Media id already exists"))?;

        claim_blob(&mut tx, &record.blob_key, claim).await?;
        adjust_usage(&mut tx, record.workspace_id.as_deref(), record.size_bytes, 1).await?;

        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media", db.operation = "select", db.record_id = %id))]
    async fn get_media(&self, id: Uuid) -> Result<Option<MediaRecord>, AppError> {
        let row = sqlx::query_as::<Postgres, MediaRow>(&format!(
            "SELECT {} FROM media WHERE id = $1",
            MEDIA_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MediaRow::into_record))
    }

    #[tracing::instrument(skip(self, patch), fields(db.table = "media", db.operation = "update", db.record_id = %id))]
    async fn update_media(&self, id: Uuid, patch: &MediaPatch) -> Result<MediaUpdate, AppError> {
        if patch.is_empty() {
            return Err(AppError::InvalidInput("Update must change at least one field".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<Postgres, MediaRow>(&format!(
            "SELECT {} FROM media WHERE id = $1 FOR UPDATE",
            MEDIA_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Media {} not found", id)))?;

        let before = row.into_record();
        let mut record = before.clone();
        patch.apply_to(&mut record, Utc::now());

        let mut released = None;
        if record.blob_key != before.blob_key {
            claim_blob(&mut tx, &record.blob_key, BlobClaim::Existing).await?;
            released = Some(release_blob(&mut tx, &before.blob_key).await?);
        }

        if record.workspace_id != before.workspace_id {
            adjust_usage(&mut tx, before.workspace_id.as_deref(), -before.size_bytes, -1).await?;
            adjust_usage(&mut tx, record.workspace_id.as_deref(), record.size_bytes, 1).await?;
        } else {
            adjust_usage(
                &mut tx,
                record.workspace_id.as_deref(),
                record.size_bytes - before.size_bytes,
                0,
            )
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE media
            SET workspace_id = $2, category = $3, filename = $4, mime_type = $5,
                size_bytes = $6, blob_key = $7, metadata = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&record.workspace_id)
        .bind(record.category)
        .bind(&record.filename)
        .bind(&record.mime_type)
        .bind(record.size_bytes)
        .bind(&record.blob_key)
        .bind(sqlx::types::Json(&record.metadata))
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(MediaUpdate { record, released })
    }

    #[tracing::instrument(skip(self), fields(db.table = "media", db.operation = "delete", db.record_id = %id))]
    async fn delete_media(&self, id: Uuid) -> Result<Option<BlobRelease>, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<Postgres, MediaRow>(&format!(
            "DELETE FROM media WHERE id = $1 RETURNING {}",
            MEDIA_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let release = release_blob(&mut tx, &row.blob_key).await?;
        adjust_usage(&mut tx, row.workspace_id.as_deref(), -row.size_bytes, -1).await?;

        tx.commit().await?;
        Ok(Some(release))
    }

    #[tracing::instrument(skip(self), fields(db.table = "media", db.operation = "select"))]
    async fn list_media_by_owner(
        &self,
        owner_id: &str,
        category: Option<MediaCategory>,
        limit: i64,
    ) -> Result<Vec<MediaRecord>, AppError> {
        let rows = sqlx::query_as::<Postgres, MediaRow>(&format!(
            r#"
            SELECT {} FROM media
            WHERE owner_id = $1 AND ($2::text IS NULL OR category = $2)
            ORDER BY created_at DESC, id
            LIMIT $3
            "#,
            MEDIA_COLUMNS
        ))
        .bind(owner_id)
        .bind(category.map(|c| c.to_string()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(MediaRow::into_record).collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media", db.operation = "select"))]
    async fn list_media_by_workspace(
        &self,
        workspace_id: &str,
        limit: i64,
    ) -> Result<Vec<MediaRecord>, AppError> {
        let rows = sqlx::query_as::<Postgres, MediaRow>(&format!(
            r#"
            SELECT {} FROM media
            WHERE workspace_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2
            "#,
            MEDIA_COLUMNS
        ))
        .bind(workspace_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(MediaRow::into_record).collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media", db.operation = "aggregate"))]
    async fn media_stats(&self, owner_id: &str) -> Result<MediaStats, AppError> {
        let rows = sqlx::query_as::<Postgres, (MediaCategory, i64, i64)>(
            r#"
            SELECT category, COUNT(*)::BIGINT, COALESCE(SUM(size_bytes), 0)::BIGINT
            FROM media
            WHERE owner_id = $1
            GROUP BY category
            ORDER BY category
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(MediaStats::from_categories(
            rows.into_iter()
                .map(|(category, count, total_size)| CategoryStats {
                    category,
                    count,
                    total_size,
                })
                .collect(),
        ))
    }
}
