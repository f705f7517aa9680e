use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;
use vellum_core::models::{MediaRecord, TrashEntry};
use vellum_core::AppError;

use super::ledger::{adjust_usage, conflict_on_unique, release_blob};
use super::rows::{MediaRow, TrashRow, MEDIA_COLUMNS};
use crate::db::traits::{BlobRelease, TrashStore};

const TRASH_COLUMNS: &str = "id, media_id, owner_id, snapshot, trashed_at, expires_at";

#[derive(Clone)]
pub struct TrashRepository {
    pool: PgPool,
}

impl TrashRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrashStore for TrashRepository {
    #[tracing::instrument(skip(self), fields(db.table = "media_trash", db.operation = "insert", db.record_id = %media_id))]
    async fn trash_media(
        &self,
        media_id: Uuid,
        trashed_at: DateTime<Utc>,
        retention: Duration,
    ) -> Result<TrashEntry, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<Postgres, MediaRow>(&format!(
            "DELETE FROM media WHERE id = $1 RETURNING {}",
            MEDIA_COLUMNS
        ))
        .bind(media_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Media {} not found", media_id)))?;

        let entry = TrashEntry::new(row.into_record(), trashed_at, retention);

        sqlx::query(
            r#"
            INSERT INTO media_trash (id, media_id, owner_id, snapshot, trashed_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.media_id)
        .bind(&entry.owner_id)
        .bind(sqlx::types::Json(&entry.snapshot))
        .bind(entry.trashed_at)
        .bind(entry.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "Media is already in the trash"))?;

        adjust_usage(
            &mut tx,
            entry.snapshot.workspace_id.as_deref(),
            -entry.snapshot.size_bytes,
            -1,
        )
        .await?;

        tx.commit().await?;
        Ok(entry)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_trash", db.operation = "select", db.record_id = %id))]
    async fn get_trash_entry(&self, id: Uuid) -> Result<Option<TrashEntry>, AppError> {
        let row = sqlx::query_as::<Postgres, TrashRow>(&format!(
            "SELECT {} FROM media_trash WHERE id = $1",
            TRASH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TrashRow::into_entry))
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_trash", db.operation = "restore", db.record_id = %id))]
    async fn restore_trash_entry(&self, id: Uuid) -> Result<MediaRecord, AppError> {
        let mut tx = self.pool.begin().await?;

        let entry = sqlx::query_as::<Postgres, TrashRow>(&format!(
            "DELETE FROM media_trash WHERE id = $1 RETURNING {}",
            TRASH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Trash entry {} not found", id)))?
        .into_entry();

        let record = entry.snapshot;

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
        .map_err(|e| conflict_on_unique(e, "A media record with this id already exists"))?;

        adjust_usage(&mut tx, record.workspace_id.as_deref(), record.size_bytes, 1).await?;

        tx.commit().await?;
        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_trash", db.operation = "delete", db.record_id = %id))]
    async fn purge_trash_entry(&self, id: Uuid) -> Result<Option<BlobRelease>, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<Postgres, TrashRow>(&format!(
            "DELETE FROM media_trash WHERE id = $1 RETURNING {}",
            TRASH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let release = release_blob(&mut tx, &row.snapshot.0.blob_key).await?;
        tx.commit().await?;
        Ok(Some(release))
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_trash", db.operation = "select"))]
    async fn list_trash(&self, owner_id: &str, limit: i64) -> Result<Vec<TrashEntry>, AppError> {
        let rows = sqlx::query_as::<Postgres, TrashRow>(&format!(
            "SELECT {} FROM media_trash WHERE owner_id = $1 ORDER BY trashed_at DESC, id LIMIT $2",
            TRASH_COLUMNS
        ))
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TrashRow::into_entry).collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_trash", db.operation = "select"))]
    async fn list_expired_trash(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TrashEntry>, AppError> {
        let rows = sqlx::query_as::<Postgres, TrashRow>(&format!(
            "SELECT {} FROM media_trash WHERE expires_at <= $1 ORDER BY expires_at ASC, id LIMIT $2",
            TRASH_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TrashRow::into_entry).collect())
    }
}
