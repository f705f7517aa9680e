use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;
use vellum_core::models::{JobStatus, JobStatusUpdate, ProcessingJob};
use vellum_core::AppError;

use super::ledger::conflict_on_unique;
use super::rows::JobRow;
use crate::db::traits::JobStore;

const JOB_COLUMNS: &str =
    "id, media_id, owner_id, job_type, status, params, result, error, created_at, updated_at";

#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for JobRepository {
    #[tracing::instrument(skip(self, job), fields(db.table = "media_processing_jobs", db.operation = "insert", db.record_id = %job.id))]
    async fn insert_job(&self, job: &ProcessingJob) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO media_processing_jobs (id, media_id, owner_id, job_type, status, params,
                                               result, error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job.id)
        .bind(job.media_id)
        .bind(&job.owner_id)
        .bind(job.job_type)
        .bind(job.status)
        .bind(&job.params)
        .bind(&job.result)
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Job id already exists"))?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_processing_jobs", db.operation = "select", db.record_id = %id))]
    async fn get_job(&self, id: Uuid) -> Result<Option<ProcessingJob>, AppError> {
        let row = sqlx::query_as::<Postgres, JobRow>(&format!(
            "SELECT {} FROM media_processing_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(JobRow::into_job))
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_processing_jobs", db.operation = "select", db.record_id = %media_id))]
    async fn list_jobs_by_media(&self, media_id: Uuid) -> Result<Vec<ProcessingJob>, AppError> {
        let rows = sqlx::query_as::<Postgres, JobRow>(&format!(
            "SELECT {} FROM media_processing_jobs WHERE media_id = $1 ORDER BY created_at DESC, id",
            JOB_COLUMNS
        ))
        .bind(media_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(JobRow::into_job).collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_processing_jobs", db.operation = "select"))]
    async fn list_jobs_by_owner(
        &self,
        owner_id: &str,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<ProcessingJob>, AppError> {
        let rows = sqlx::query_as::<Postgres, JobRow>(&format!(
            r#"
            SELECT {} FROM media_processing_jobs
            WHERE owner_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC, id
            LIMIT $3
            "#,
            JOB_COLUMNS
        ))
        .bind(owner_id)
        .bind(status.map(|s| s.to_string()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(JobRow::into_job).collect())
    }

    #[tracing::instrument(skip(self, update), fields(db.table = "media_processing_jobs", db.operation = "update", db.record_id = %id))]
    async fn update_job_status(
        &self,
        id: Uuid,
        update: &JobStatusUpdate,
    ) -> Result<Option<ProcessingJob>, AppError> {
        let row = sqlx::query_as::<Postgres, JobRow>(&format!(
            r#"
            UPDATE media_processing_jobs
            SET status = $2,
                result = COALESCE($3, result),
                error = COALESCE($4, error),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(update.status)
        .bind(&update.result)
        .bind(&update.error)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(JobRow::into_job))
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_processing_jobs", db.operation = "cancel", db.record_id = %id))]
    async fn cancel_job(&self, id: Uuid, owner_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE media_processing_jobs
            SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND owner_id = $2 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
