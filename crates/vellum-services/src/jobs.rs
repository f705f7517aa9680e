//! Processing job bookkeeping
//!
//! Records processing requests against media and tracks their status. The
//! processing itself runs elsewhere and reports back through `update_status`.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use vellum_core::constants::clamp_limit;
use vellum_core::models::{JobStatus, JobStatusUpdate, NewProcessingJob, ProcessingJob};
use vellum_core::{AppError, AppResult};
use vellum_db::{JobStore, MediaStore, Stores};

use crate::lifecycle::ensure_owner;

#[derive(Clone)]
pub struct ProcessingJobService {
    media: Arc<dyn MediaStore>,
    jobs: Arc<dyn JobStore>,
}

impl ProcessingJobService {
    pub fn new(stores: &Stores) -> Self {
        Self {
            media: stores.media.clone(),
            jobs: stores.jobs.clone(),
        }
    }

    async fn load_job(&self, job_id: Uuid) -> AppResult<ProcessingJob> {
        self.jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
    }

    #[tracing::instrument(skip(self, input), fields(job_type = %input.job_type))]
    pub async fn create_job(
        &self,
        media_id: Uuid,
        caller: &str,
        input: NewProcessingJob,
    ) -> AppResult<ProcessingJob> {
        let media = self
            .media
            .get_media(media_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Media {} not found", media_id)))?;
        ensure_owner(&media, caller)?;

        let now = Utc::now();
        let job = ProcessingJob {
            id: Uuid::new_v4(),
            media_id,
            owner_id: caller.to_string(),
            job_type: input.job_type,
            status: JobStatus::Pending,
            params: input.params,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.insert_job(&job).await?;

        tracing::info!(job_id = %job.id, "Processing job created");
        Ok(job)
    }

    pub async fn get_job(&self, job_id: Uuid, caller: &str) -> AppResult<ProcessingJob> {
        let job = self.load_job(job_id).await?;
        if job.owner_id != caller {
            return Err(AppError::Unauthorized(format!(
                "Job {} belongs to another owner",
                job_id
            )));
        }
        Ok(job)
    }

    /// Jobs of `caller` for one media object, newest first.
    pub async fn jobs_by_media(&self, media_id: Uuid, caller: &str) -> AppResult<Vec<ProcessingJob>> {
        let mut jobs = self.jobs.list_jobs_by_media(media_id).await?;
        jobs.retain(|job| job.owner_id == caller);
        Ok(jobs)
    }

    pub async fn user_jobs(
        &self,
        caller: &str,
        status: Option<JobStatus>,
        limit: Option<i64>,
    ) -> AppResult<Vec<ProcessingJob>> {
        self.jobs
            .list_jobs_by_owner(caller, status, clamp_limit(limit))
            .await
    }

    /// Record a status transition. Finished jobs are frozen.
    #[tracing::instrument(skip(self, update), fields(status = %update.status))]
    pub async fn update_status(
        &self,
        job_id: Uuid,
        update: JobStatusUpdate,
    ) -> AppResult<ProcessingJob> {
        let job = self.load_job(job_id).await?;
        if job.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Job {} already finished with status {}",
                job_id, job.status
            )));
        }

        let updated = self
            .jobs
            .update_job_status(job_id, &update)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;

        tracing::info!(from = %job.status, "Processing job status updated");
        Ok(updated)
    }

    /// Only pending jobs can be cancelled, and only by their owner.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_job(&self, job_id: Uuid, caller: &str) -> AppResult<()> {
        if self.jobs.cancel_job(job_id, caller).await? {
            tracing::info!("Processing job cancelled");
            return Ok(());
        }

        let job = self.get_job(job_id, caller).await?;
        Err(AppError::Conflict(format!(
            "Job {} is {} and can no longer be cancelled",
            job_id, job.status
        )))
    }
}
