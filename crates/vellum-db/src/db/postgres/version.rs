use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;
use vellum_core::models::MediaVersion;
use vellum_core::AppError;

use super::ledger::{claim_blob, conflict_on_unique, release_blob};
use super::rows::VersionRow;
use crate::db::traits::{BlobClaim, BlobRelease, VersionStore};

const VERSION_COLUMNS: &str = "id, media_id, version_number, filename, mime_type, size_bytes, blob_key, uploaded_by, comment, created_at";

#[derive(Clone)]
pub struct VersionRepository {
    pool: PgPool,
}

impl VersionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VersionStore for VersionRepository {
    #[tracing::instrument(skip(self), fields(db.table = "media_version_counters", db.operation = "upsert", db.record_id = %media_id))]
    async fn next_version_number(&self, media_id: Uuid) -> Result<i32, AppError> {
        // First allocation seeds from any versions already on record.
        let next = sqlx::query_scalar::<Postgres, i32>(
            r#"
            INSERT INTO media_version_counters (media_id, last_number)
            SELECT $1, COALESCE(MAX(version_number), 0) + 1
            FROM media_versions
            WHERE media_id = $1
            ON CONFLICT (media_id)
            DO UPDATE SET last_number = media_version_counters.last_number + 1
            RETURNING last_number
            "#,
        )
        .bind(media_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(next)
    }

    #[tracing::instrument(
        skip(self, version),
        fields(
            db.table = "media_versions",
            db.operation = "insert",
            db.record_id = %version.media_id,
            version_number = version.version_number
        )
    )]
    async fn insert_version(&self, version: &MediaVersion) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO media_versions (id, media_id, version_number, filename, mime_type,
                                        size_bytes, blob_key, uploaded_by, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(version.id)
        .bind(version.media_id)
        .bind(version.version_number)
        .bind(&version.filename)
        .bind(&version.mime_type)
        .bind(version.size_bytes)
        .bind(&version.blob_key)
        .bind(&version.uploaded_by)
        .bind(&version.comment)
        .bind(version.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            conflict_on_unique(
                e,
                &format!(
                    "Version {} of media {} already exists",
                    version.version_number, version.media_id
                ),
            )
        })?;

        claim_blob(&mut tx, &version.blob_key, BlobClaim::New).await?;

        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_versions", db.operation = "select", db.record_id = %id))]
    async fn get_version(&self, id: Uuid) -> Result<Option<MediaVersion>, AppError> {
        let row = sqlx::query_as::<Postgres, VersionRow>(&format!(
            "SELECT {} FROM media_versions WHERE id = $1",
            VERSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(VersionRow::into_version))
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_versions", db.operation = "select", db.record_id = %media_id))]
    async fn list_versions(&self, media_id: Uuid) -> Result<Vec<MediaVersion>, AppError> {
        let rows = sqlx::query_as::<Postgres, VersionRow>(&format!(
            "SELECT {} FROM media_versions WHERE media_id = $1 ORDER BY version_number DESC",
            VERSION_COLUMNS
        ))
        .bind(media_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(VersionRow::into_version).collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_versions", db.operation = "delete", db.record_id = %id))]
    async fn delete_version(&self, id: Uuid) -> Result<Option<BlobRelease>, AppError> {
        let mut tx = self.pool.begin().await?;

        let blob_key = sqlx::query_scalar::<Postgres, String>(
            "DELETE FROM media_versions WHERE id = $1 RETURNING blob_key",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(blob_key) = blob_key else {
            return Ok(None);
        };

        let release = release_blob(&mut tx, &blob_key).await?;
        tx.commit().await?;
        Ok(Some(release))
    }
}
