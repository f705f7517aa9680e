//! Store traits for the metadata layer
//!
//! Every method is one atomic unit: it either commits all of its effects
//! (record change, blob reference change, usage ledger change) or none.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use vellum_core::models::{
    JobStatus, JobStatusUpdate, MediaCategory, MediaPatch, MediaRecord, MediaStats, MediaVersion,
    ProcessingJob, StorageQuota, TrashEntry,
};
use vellum_core::AppError;

/// How an insert claims its blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobClaim {
    /// Freshly derived key; the reference row is created if absent.
    New,
    /// Key already held by another record. Fails with `NotFound` when the last
    /// reference was released in the meantime.
    Existing,
}

/// A blob reference released by a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRelease {
    pub blob_key: String,
    /// References left after the release.
    pub remaining: i64,
}

impl BlobRelease {
    /// True when nothing references the blob any more and it may be deleted.
    pub fn is_unreferenced(&self) -> bool {
        self.remaining <= 0
    }
}

/// Result of a committed partial update.
#[derive(Debug, Clone)]
pub struct MediaUpdate {
    pub record: MediaRecord,
    /// Set when the update repointed the record away from a blob.
    pub released: Option<BlobRelease>,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Insert a record, claim its blob and charge its workspace.
    async fn insert_media(&self, record: &MediaRecord, claim: BlobClaim) -> Result<(), AppError>;

    async fn get_media(&self, id: Uuid) -> Result<Option<MediaRecord>, AppError>;

    /// Apply a non-empty patch. `NotFound` if the record does not exist.
    /// Workspace moves and blob repoints adjust the ledgers atomically.
    async fn update_media(&self, id: Uuid, patch: &MediaPatch) -> Result<MediaUpdate, AppError>;

    /// Delete a record and release its blob. `None` if it did not exist.
    async fn delete_media(&self, id: Uuid) -> Result<Option<BlobRelease>, AppError>;

    /// Newest first.
    async fn list_media_by_owner(
        &self,
        owner_id: &str,
        category: Option<MediaCategory>,
        limit: i64,
    ) -> Result<Vec<MediaRecord>, AppError>;

    /// Records attributed to the workspace, newest first.
    async fn list_media_by_workspace(
        &self,
        workspace_id: &str,
        limit: i64,
    ) -> Result<Vec<MediaRecord>, AppError>;

    async fn media_stats(&self, owner_id: &str) -> Result<MediaStats, AppError>;
}

#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Allocate the next version number for the media. Numbers only grow: one
    /// that was handed out is never returned again, even after its version is
    /// deleted.
    async fn next_version_number(&self, media_id: Uuid) -> Result<i32, AppError>;

    /// Insert a version and claim its blob. `Conflict` when the number is taken.
    async fn insert_version(&self, version: &MediaVersion) -> Result<(), AppError>;

    async fn get_version(&self, id: Uuid) -> Result<Option<MediaVersion>, AppError>;

    /// Descending by version number.
    async fn list_versions(&self, media_id: Uuid) -> Result<Vec<MediaVersion>, AppError>;

    async fn delete_version(&self, id: Uuid) -> Result<Option<BlobRelease>, AppError>;
}

#[async_trait]
pub trait TrashStore: Send + Sync {
    /// Delete the media row and insert a trash entry holding its snapshot, in one
    /// transaction. The snapshot is taken from the deleted row itself. The blob
    /// reference moves to the entry; the workspace is credited. `NotFound` if the
    /// media row is already gone.
    async fn trash_media(
        &self,
        media_id: Uuid,
        trashed_at: DateTime<Utc>,
        retention: Duration,
    ) -> Result<TrashEntry, AppError>;

    async fn get_trash_entry(&self, id: Uuid) -> Result<Option<TrashEntry>, AppError>;

    /// Re-insert the snapshot under its original id and delete the entry.
    /// `NotFound` if the entry is gone.
    async fn restore_trash_entry(&self, id: Uuid) -> Result<MediaRecord, AppError>;

    /// Delete the entry and release the snapshot's blob. `None` if it did not exist.
    async fn purge_trash_entry(&self, id: Uuid) -> Result<Option<BlobRelease>, AppError>;

    /// Newest first.
    async fn list_trash(&self, owner_id: &str, limit: i64) -> Result<Vec<TrashEntry>, AppError>;

    /// Soonest expiry first.
    async fn list_expired_trash(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TrashEntry>, AppError>;
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Create or update the limits for a workspace. Usage counters are never reset.
    async fn upsert_quota(
        &self,
        workspace_id: &str,
        max_storage_mb: i64,
        max_file_count: i64,
    ) -> Result<StorageQuota, AppError>;

    async fn get_quota(&self, workspace_id: &str) -> Result<Option<StorageQuota>, AppError>;

    async fn list_over_quota(&self, limit: i64) -> Result<Vec<StorageQuota>, AppError>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &ProcessingJob) -> Result<(), AppError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<ProcessingJob>, AppError>;

    /// Newest first.
    async fn list_jobs_by_media(&self, media_id: Uuid) -> Result<Vec<ProcessingJob>, AppError>;

    /// Newest first, optionally filtered by status.
    async fn list_jobs_by_owner(
        &self,
        owner_id: &str,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<ProcessingJob>, AppError>;

    /// Returns the updated job, `None` if it does not exist.
    async fn update_job_status(
        &self,
        id: Uuid,
        update: &JobStatusUpdate,
    ) -> Result<Option<ProcessingJob>, AppError>;

    /// Cancel a job that is still pending and owned by `owner_id`.
    /// Returns whether a job was cancelled.
    async fn cancel_job(&self, id: Uuid, owner_id: &str) -> Result<bool, AppError>;
}
