//! In-process implementation of every store trait
//!
//! All state sits behind one mutex, so each trait call observes and mutates it
//! atomically, the same way a single PostgreSQL transaction does. The lock is
//! never held across an `.await`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;
use vellum_core::models::{
    CategoryStats, JobStatus, JobStatusUpdate, MediaCategory, MediaPatch, MediaRecord,
    MediaStats, MediaVersion, ProcessingJob, StorageQuota, TrashEntry,
};
use vellum_core::AppError;

use super::traits::{
    BlobClaim, BlobRelease, JobStore, MediaStore, MediaUpdate, QuotaStore, TrashStore,
    VersionStore,
};

#[derive(Debug, Clone)]
struct QuotaLimits {
    id: Uuid,
    max_storage_mb: i64,
    max_file_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    media: HashMap<Uuid, MediaRecord>,
    versions: HashMap<Uuid, MediaVersion>,
    version_counters: HashMap<Uuid, i32>,
    trash: HashMap<Uuid, TrashEntry>,
    quotas: HashMap<String, QuotaLimits>,
    usage: HashMap<String, (i64, i64)>,
    blob_refs: HashMap<String, i64>,
    jobs: HashMap<Uuid, ProcessingJob>,
}

impl State {
    fn can_claim(&self, blob_key: &str, claim: BlobClaim) -> Result<(), AppError> {
        match claim {
            BlobClaim::New => Ok(()),
            BlobClaim::Existing if self.blob_refs.contains_key(blob_key) => Ok(()),
            BlobClaim::Existing => Err(AppError::NotFound(format!(
                "Blob {} is no longer referenced",
                blob_key
            ))),
        }
    }

    fn claim(&mut self, blob_key: &str) {
        *self.blob_refs.entry(blob_key.to_string()).or_insert(0) += 1;
    }

    fn release(&mut self, blob_key: &str) -> BlobRelease {
        let remaining = match self.blob_refs.get_mut(blob_key) {
            Some(count) if *count > 1 => {
                *count -= 1;
                *count
            }
            Some(_) => {
                self.blob_refs.remove(blob_key);
                0
            }
            None => 0,
        };
        BlobRelease {
            blob_key: blob_key.to_string(),
            remaining,
        }
    }

    fn adjust_usage(&mut self, workspace_id: Option<&str>, delta_bytes: i64, delta_files: i64) {
        if let Some(workspace_id) = workspace_id {
            let usage = self.usage.entry(workspace_id.to_string()).or_insert((0, 0));
            usage.0 += delta_bytes;
            usage.1 += delta_files;
        }
    }

    fn quota(&self, workspace_id: &str) -> Option<StorageQuota> {
        let limits = self.quotas.get(workspace_id)?;
        let (used_storage_bytes, current_file_count) =
            self.usage.get(workspace_id).copied().unwrap_or((0, 0));
        Some(StorageQuota {
            id: limits.id,
            workspace_id: workspace_id.to_string(),
            max_storage_mb: limits.max_storage_mb,
            used_storage_bytes,
            max_file_count: limits.max_file_count,
            current_file_count,
            created_at: limits.created_at,
            updated_at: limits.updated_at,
        })
    }
}

/// In-memory store for tests and local experiments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }

    /// Current reference count of a blob, 0 when unreferenced.
    pub fn blob_ref_count(&self, blob_key: &str) -> i64 {
        self.state()
            .map(|s| s.blob_refs.get(blob_key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// `(used_storage_bytes, current_file_count)` from the usage ledger.
    pub fn workspace_usage(&self, workspace_id: &str) -> (i64, i64) {
        self.state()
            .map(|s| s.usage.get(workspace_id).copied().unwrap_or((0, 0)))
            .unwrap_or((0, 0))
    }

    pub fn media_count(&self) -> usize {
        self.state().map(|s| s.media.len()).unwrap_or(0)
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, Uuid)) {
    items.sort_by(|a, b| {
        let (at, aid) = key(a);
        let (bt, bid) = key(b);
        bt.cmp(&at).then(aid.cmp(&bid))
    });
}

fn take(limit: i64) -> usize {
    usize::try_from(limit).unwrap_or(0)
}

#[async_trait]
impl MediaStore for MemoryStore {
    async fn insert_media(&self, record: &MediaRecord, claim: BlobClaim) -> Result<(), AppError> {
        let mut state = self.state()?;
        if state.media.contains_key(&record.id) {
            return Err(AppError::Conflict("Media id already exists".to_string()));
        }
        state.can_claim(&record.blob_key, claim)?;

        state.claim(&record.blob_key);
        state.adjust_usage(record.workspace_id.as_deref(), record.size_bytes, 1);
        state.media.insert(record.id, record.without_url());
        Ok(())
    }

    async fn get_media(&self, id: Uuid) -> Result<Option<MediaRecord>, AppError> {
        Ok(self.state()?.media.get(&id).cloned())
    }

    async fn update_media(&self, id: Uuid, patch: &MediaPatch) -> Result<MediaUpdate, AppError> {
        if patch.is_empty() {
            return Err(AppError::InvalidInput(
                "Update must change at least one field".to_string(),
            ));
        }

        let mut state = self.state()?;
        let before = state
            .media
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Media {} not found", id)))?;

        let mut record = before.clone();
        patch.apply_to(&mut record, Utc::now());

        let repointed = record.blob_key != before.blob_key;
        if repointed {
            state.can_claim(&record.blob_key, BlobClaim::Existing)?;
        }

        let mut released = None;
        if repointed {
            state.claim(&record.blob_key);
            released = Some(state.release(&before.blob_key));
        }

        if record.workspace_id != before.workspace_id {
            state.adjust_usage(before.workspace_id.as_deref(), -before.size_bytes, -1);
            state.adjust_usage(record.workspace_id.as_deref(), record.size_bytes, 1);
        } else {
            state.adjust_usage(
                record.workspace_id.as_deref(),
                record.size_bytes - before.size_bytes,
                0,
            );
        }

        state.media.insert(id, record.clone());
        Ok(MediaUpdate { record, released })
    }

    async fn delete_media(&self, id: Uuid) -> Result<Option<BlobRelease>, AppError> {
        let mut state = self.state()?;
        let Some(record) = state.media.remove(&id) else {
            return Ok(None);
        };
        state.adjust_usage(record.workspace_id.as_deref(), -record.size_bytes, -1);
        Ok(Some(state.release(&record.blob_key)))
    }

    async fn list_media_by_owner(
        &self,
        owner_id: &str,
        category: Option<MediaCategory>,
        limit: i64,
    ) -> Result<Vec<MediaRecord>, AppError> {
        let state = self.state()?;
        let mut records: Vec<MediaRecord> = state
            .media
            .values()
            .filter(|m| m.owner_id == owner_id)
            .filter(|m| category.map_or(true, |c| m.category == c))
            .cloned()
            .collect();
        newest_first(&mut records, |m| (m.created_at, m.id));
        records.truncate(take(limit));
        Ok(records)
    }

    async fn list_media_by_workspace(
        &self,
        workspace_id: &str,
        limit: i64,
    ) -> Result<Vec<MediaRecord>, AppError> {
        let state = self.state()?;
        let mut records: Vec<MediaRecord> = state
            .media
            .values()
            .filter(|m| m.workspace_id.as_deref() == Some(workspace_id))
            .cloned()
            .collect();
        newest_first(&mut records, |m| (m.created_at, m.id));
        records.truncate(take(limit));
        Ok(records)
    }

    async fn media_stats(&self, owner_id: &str) -> Result<MediaStats, AppError> {
        let state = self.state()?;
        let mut totals: HashMap<MediaCategory, (i64, i64)> = HashMap::new();
        for record in state.media.values().filter(|m| m.owner_id == owner_id) {
            let entry = totals.entry(record.category).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += record.size_bytes;
        }
        Ok(MediaStats::from_categories(
            totals
                .into_iter()
                .map(|(category, (count, total_size))| CategoryStats {
                    category,
                    count,
                    total_size,
                })
                .collect(),
        ))
    }
}

#[async_trait]
impl VersionStore for MemoryStore {
    async fn next_version_number(&self, media_id: Uuid) -> Result<i32, AppError> {
        let mut state = self.state()?;
        let on_record = state
            .versions
            .values()
            .filter(|v| v.media_id == media_id)
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0);
        let counter = state.version_counters.entry(media_id).or_insert(0);
        *counter = (*counter).max(on_record) + 1;
        Ok(*counter)
    }

    async fn insert_version(&self, version: &MediaVersion) -> Result<(), AppError> {
        let mut state = self.state()?;
        let taken = state.versions.values().any(|v| {
            v.media_id == version.media_id && v.version_number == version.version_number
        });
        if taken {
            return Err(AppError::Conflict(format!(
                "Version {} of media {} already exists",
                version.version_number, version.media_id
            )));
        }
        state.claim(&version.blob_key);
        let mut stored = version.clone();
        stored.url = None;
        state.versions.insert(version.id, stored);
        Ok(())
    }

    async fn get_version(&self, id: Uuid) -> Result<Option<MediaVersion>, AppError> {
        Ok(self.state()?.versions.get(&id).cloned())
    }

    async fn list_versions(&self, media_id: Uuid) -> Result<Vec<MediaVersion>, AppError> {
        let state = self.state()?;
        let mut versions: Vec<MediaVersion> = state
            .versions
            .values()
            .filter(|v| v.media_id == media_id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(versions)
    }

    async fn delete_version(&self, id: Uuid) -> Result<Option<BlobRelease>, AppError> {
        let mut state = self.state()?;
        let Some(version) = state.versions.remove(&id) else {
            return Ok(None);
        };
        Ok(Some(state.release(&version.blob_key)))
    }
}

#[async_trait]
impl TrashStore for MemoryStore {
    async fn trash_media(
        &self,
        media_id: Uuid,
        trashed_at: DateTime<Utc>,
        retention: Duration,
    ) -> Result<TrashEntry, AppError> {
        let mut state = self.state()?;
        if !state.media.contains_key(&media_id) {
            return Err(AppError::NotFound(format!("Media {} not found", media_id)));
        }
        if state.trash.values().any(|e| e.media_id == media_id) {
            return Err(AppError::Conflict("Media is already in the trash".to_string()));
        }
        let record = state
            .media
            .remove(&media_id)
            .ok_or_else(|| AppError::NotFound(format!("Media {} not found", media_id)))?;

        let entry = TrashEntry::new(record, trashed_at, retention);
        state.adjust_usage(
            entry.snapshot.workspace_id.as_deref(),
            -entry.snapshot.size_bytes,
            -1,
        );
        state.trash.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn get_trash_entry(&self, id: Uuid) -> Result<Option<TrashEntry>, AppError> {
        Ok(self.state()?.trash.get(&id).cloned())
    }

    async fn restore_trash_entry(&self, id: Uuid) -> Result<MediaRecord, AppError> {
        let mut state = self.state()?;
        let media_id = state
            .trash
            .get(&id)
            .map(|e| e.media_id)
            .ok_or_else(|| AppError::NotFound(format!("Trash entry {} not found", id)))?;
        if state.media.contains_key(&media_id) {
            return Err(AppError::Conflict(
                "A media record with this id already exists".to_string(),
            ));
        }

        let entry = state
            .trash
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("Trash entry {} not found", id)))?;
        let record = entry.snapshot;
        state.adjust_usage(record.workspace_id.as_deref(), record.size_bytes, 1);
        state.media.insert(record.id, record.clone());
        Ok(record)
    }

    async fn purge_trash_entry(&self, id: Uuid) -> Result<Option<BlobRelease>, AppError> {
        let mut state = self.state()?;
        let Some(entry) = state.trash.remove(&id) else {
            return Ok(None);
        };
        Ok(Some(state.release(&entry.snapshot.blob_key)))
    }

    async fn list_trash(&self, owner_id: &str, limit: i64) -> Result<Vec<TrashEntry>, AppError> {
        let state = self.state()?;
        let mut entries: Vec<TrashEntry> = state
            .trash
            .values()
            .filter(|e| e.owner_id == owner_id)
            .cloned()
            .collect();
        newest_first(&mut entries, |e| (e.trashed_at, e.id));
        entries.truncate(take(limit));
        Ok(entries)
    }

    async fn list_expired_trash(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TrashEntry>, AppError> {
        let state = self.state()?;
        let mut entries: Vec<TrashEntry> = state
            .trash
            .values()
            .filter(|e| e.is_expired(now))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then(a.id.cmp(&b.id)));
        entries.truncate(take(limit));
        Ok(entries)
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn upsert_quota(
        &self,
        workspace_id: &str,
        max_storage_mb: i64,
        max_file_count: i64,
    ) -> Result<StorageQuota, AppError> {
        let mut state = self.state()?;
        let now = Utc::now();
        state
            .quotas
            .entry(workspace_id.to_string())
            .and_modify(|q| {
                q.max_storage_mb = max_storage_mb;
                q.max_file_count = max_file_count;
                q.updated_at = now;
            })
            .or_insert(QuotaLimits {
                id: Uuid::new_v4(),
                max_storage_mb,
                max_file_count,
                created_at: now,
                updated_at: now,
            });
        state
            .quota(workspace_id)
            .ok_or_else(|| AppError::Internal("quota vanished after upsert".to_string()))
    }

    async fn get_quota(&self, workspace_id: &str) -> Result<Option<StorageQuota>, AppError> {
        Ok(self.state()?.quota(workspace_id))
    }

    async fn list_over_quota(&self, limit: i64) -> Result<Vec<StorageQuota>, AppError> {
        let state = self.state()?;
        let mut over: Vec<StorageQuota> = state
            .quotas
            .keys()
            .filter_map(|ws| state.quota(ws))
            .filter(StorageQuota::is_over_quota)
            .collect();
        over.sort_by(|a, b| a.workspace_id.cmp(&b.workspace_id));
        over.truncate(take(limit));
        Ok(over)
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &ProcessingJob) -> Result<(), AppError> {
        let mut state = self.state()?;
        if state.jobs.contains_key(&job.id) {
            return Err(AppError::Conflict("Job id already exists".to_string()));
        }
        state.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<ProcessingJob>, AppError> {
        Ok(self.state()?.jobs.get(&id).cloned())
    }

    async fn list_jobs_by_media(&self, media_id: Uuid) -> Result<Vec<ProcessingJob>, AppError> {
        let state = self.state()?;
        let mut jobs: Vec<ProcessingJob> = state
            .jobs
            .values()
            .filter(|j| j.media_id == media_id)
            .cloned()
            .collect();
        newest_first(&mut jobs, |j| (j.created_at, j.id));
        Ok(jobs)
    }

    async fn list_jobs_by_owner(
        &self,
        owner_id: &str,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<ProcessingJob>, AppError> {
        let state = self.state()?;
        let mut jobs: Vec<ProcessingJob> = state
            .jobs
            .values()
            .filter(|j| j.owner_id == owner_id)
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        newest_first(&mut jobs, |j| (j.created_at, j.id));
        jobs.truncate(take(limit));
        Ok(jobs)
    }

    async fn update_job_status(
        &self,
        id: Uuid,
        update: &JobStatusUpdate,
    ) -> Result<Option<ProcessingJob>, AppError> {
        let mut state = self.state()?;
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };
        job.status = update.status;
        if update.result.is_some() {
            job.result = update.result.clone();
        }
        if update.error.is_some() {
            job.error = update.error.clone();
        }
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn cancel_job(&self, id: Uuid, owner_id: &str) -> Result<bool, AppError> {
        let mut state = self.state()?;
        match state.jobs.get_mut(&id) {
            Some(job) if job.owner_id == owner_id && job.status == JobStatus::Pending => {
                job.status = JobStatus::Cancelled;
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(owner: &str, workspace: Option<&str>, blob_key: &str, size: i64) -> MediaRecord {
        let now = Utc::now();
        MediaRecord {
            id: Uuid::new_v4(),
            owner_id: owner.to_string(),
            workspace_id: workspace.map(str::to_string),
            category: MediaCategory::Image,
            filename: "cat.png".to_string(),
            mime_type: "image/png".to_string(),
            size_bytes: size,
            blob_key: blob_key.to_string(),
            metadata: HashMap::new(),
            url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_claims_blob_and_charges_workspace() {
        let store = MemoryStore::new();
        let media = record("u1", Some("ws1"), "media/u1/a/cat.png", 2048);
        store.insert_media(&media, BlobClaim::New).await.unwrap();

        assert_eq!(store.blob_ref_count("media/u1/a/cat.png"), 1);
        assert_eq!(store.workspace_usage("ws1"), (2048, 1));
        assert_eq!(store.get_media(media.id).await.unwrap(), Some(media));
    }

    #[tokio::test]
    async fn existing_claim_fails_once_blob_released() {
        let store = MemoryStore::new();
        let original = record("u1", None, "media/u1/a/cat.png", 10);
        store.insert_media(&original, BlobClaim::New).await.unwrap();

        let release = store.delete_media(original.id).await.unwrap().unwrap();
        assert!(release.is_unreferenced());

        let copy = record("u1", None, "media/u1/a/cat.png", 10);
        let err = store
            .insert_media(&copy, BlobClaim::Existing)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.media_count(), 0);
    }

    #[tokio::test]
    async fn shared_blob_released_only_by_last_holder() {
        let store = MemoryStore::new();
        let a = record("u1", None, "k", 10);
        let b = record("u1", None, "k", 10);
        store.insert_media(&a, BlobClaim::New).await.unwrap();
        store.insert_media(&b, BlobClaim::Existing).await.unwrap();

        let first = store.delete_media(a.id).await.unwrap().unwrap();
        assert_eq!(first.remaining, 1);
        let second = store.delete_media(b.id).await.unwrap().unwrap();
        assert!(second.is_unreferenced());
        assert_eq!(store.delete_media(b.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn move_shifts_usage_between_workspaces() {
        let store = MemoryStore::new();
        let media = record("u1", Some("ws1"), "k", 500);
        store.insert_media(&media, BlobClaim::New).await.unwrap();

        store
            .update_media(media.id, &MediaPatch::move_to(Some("ws2".to_string())))
            .await
            .unwrap();

        assert_eq!(store.workspace_usage("ws1"), (0, 0));
        assert_eq!(store.workspace_usage("ws2"), (500, 1));
    }

    #[tokio::test]
    async fn empty_patch_is_rejected() {
        let store = MemoryStore::new();
        let media = record("u1", None, "k", 1);
        store.insert_media(&media, BlobClaim::New).await.unwrap();

        let err = store
            .update_media(media.id, &MediaPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn duplicate_version_number_conflicts() {
        let store = MemoryStore::new();
        let media_id = Uuid::new_v4();
        let version = |n: i32| MediaVersion {
            id: Uuid::new_v4(),
            media_id,
            version_number: n,
            filename: "cat.png".to_string(),
            mime_type: "image/png".to_string(),
            size_bytes: 1,
            blob_key: format!("media/u1/{}/versions/{}/cat.png", media_id, n),
            uploaded_by: "u1".to_string(),
            comment: None,
            url: None,
            created_at: Utc::now(),
        };

        store.insert_version(&version(1)).await.unwrap();
        let err = store.insert_version(&version(1)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.next_version_number(media_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn version_numbers_survive_deletes() {
        let store = MemoryStore::new();
        let media_id = Uuid::new_v4();
        assert_eq!(store.next_version_number(media_id).await.unwrap(), 1);
        assert_eq!(store.next_version_number(media_id).await.unwrap(), 2);
        // Nothing was inserted; allocated numbers are still spent.
        assert_eq!(store.next_version_number(media_id).await.unwrap(), 3);
        assert_eq!(store.next_version_number(Uuid::new_v4()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn trash_round_trip_keeps_blob_reference() {
        let store = MemoryStore::new();
        let media = record("u1", Some("ws1"), "k", 64);
        store.insert_media(&media, BlobClaim::New).await.unwrap();

        let entry = store
            .trash_media(media.id, Utc::now(), Duration::days(30))
            .await
            .unwrap();
        assert_eq!(store.blob_ref_count("k"), 1);
        assert_eq!(store.workspace_usage("ws1"), (0, 0));
        assert!(store.get_media(media.id).await.unwrap().is_none());

        let restored = store.restore_trash_entry(entry.id).await.unwrap();
        assert_eq!(restored, media);
        assert_eq!(store.workspace_usage("ws1"), (64, 1));
        assert!(store.get_trash_entry(entry.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn quota_reads_existing_ledger_and_keeps_it_on_update() {
        let store = MemoryStore::new();
        store
            .insert_media(&record("u1", Some("ws1"), "k", 3 * 1024 * 1024), BlobClaim::New)
            .await
            .unwrap();

        let quota = store.upsert_quota("ws1", 1, 10).await.unwrap();
        assert_eq!(quota.used_storage_bytes, 3 * 1024 * 1024);
        assert_eq!(store.list_over_quota(10).await.unwrap().len(), 1);

        let quota = store.upsert_quota("ws1", 100, 10).await.unwrap();
        assert_eq!(quota.current_file_count, 1);
        assert!(store.list_over_quota(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_only_pending_jobs_of_owner() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let job = ProcessingJob {
            id: Uuid::new_v4(),
            media_id: Uuid::new_v4(),
            owner_id: "u1".to_string(),
            job_type: vellum_core::models::JobType::Thumbnail,
            status: JobStatus::Pending,
            params: serde_json::json!({}),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_job(&job).await.unwrap();

        assert!(!store.cancel_job(job.id, "u2").await.unwrap());
        assert!(store.cancel_job(job.id, "u1").await.unwrap());
        assert!(!store.cancel_job(job.id, "u1").await.unwrap());
    }
}
