//! Media Lifecycle Manager
//!
//! Owns the cache-aside read path and every single-record mutation. Store
//! mutations commit first; the cache entry is invalidated after the commit and
//! the physical blob is deleted last, only once no record references it.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vellum_core::constants::clamp_limit;
use vellum_core::models::{
    BulkOutcome, MediaCategory, MediaPatch, MediaRecord, MediaStats, NewMedia, UploadTicket,
};
use vellum_core::validation::{validate_filename, validate_metadata, validate_new_media};
use vellum_core::{AppError, AppResult};
use vellum_db::{BlobClaim, MediaStore, Stores};
use vellum_infra::cache::{CacheLookup, GuardedCache};
use vellum_storage::Storage;

use crate::blobs::delete_if_unreferenced;
use crate::media_cache_key;
use crate::quota::QuotaService;
use crate::settings::LifecycleSettings;

#[derive(Clone)]
pub struct MediaLifecycleService {
    media: Arc<dyn MediaStore>,
    quotas: QuotaService,
    storage: Arc<dyn Storage>,
    cache: GuardedCache,
    settings: LifecycleSettings,
}

impl MediaLifecycleService {
    pub fn new(
        stores: &Stores,
        storage: Arc<dyn Storage>,
        cache: GuardedCache,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            media: stores.media.clone(),
            quotas: QuotaService::new(stores.quotas.clone()),
            storage,
            cache,
            settings,
        }
    }

    /// Validate input and build the record for a new media object.
    async fn prepare(&self, owner_id: &str, input: NewMedia) -> AppResult<MediaRecord> {
        validate_new_media(&input)?;

        if self.settings.quota_enforcement {
            if let Some(ref workspace_id) = input.workspace_id {
                self.quotas
                    .check_headroom(workspace_id, input.size_bytes)
                    .await?;
            }
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        Ok(MediaRecord {
            id,
            owner_id: owner_id.to_string(),
            workspace_id: input.workspace_id,
            category: MediaCategory::from_mime_type(&input.mime_type),
            blob_key: self.storage.blob_key(owner_id, id, None, &input.filename),
            filename: input.filename,
            mime_type: input.mime_type,
            size_bytes: input.size_bytes,
            metadata: input.metadata,
            url: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Register a media record. The bytes are uploaded separately.
    #[tracing::instrument(skip(self, input), fields(filename = %input.filename))]
    pub async fn create(&self, owner_id: &str, input: NewMedia) -> AppResult<MediaRecord> {
        let record = self.prepare(owner_id, input).await?;
        self.media.insert_media(&record, BlobClaim::New).await?;

        tracing::info!(
            media_id = %record.id,
            category = %record.category,
            size_bytes = record.size_bytes,
            "Media created"
        );
        Ok(record)
    }

    /// Register a media record and return a presigned PUT URL for its blob.
    #[tracing::instrument(skip(self, input), fields(filename = %input.filename))]
    pub async fn create_upload(&self, owner_id: &str, input: NewMedia) -> AppResult<UploadTicket> {
        let record = self.prepare(owner_id, input).await?;
        let upload_url = self
            .storage
            .presigned_put_url(
                &record.blob_key,
                &record.mime_type,
                self.settings.upload_url_ttl,
            )
            .await?;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.settings.upload_url_ttl)
                .map_err(|e| AppError::Internal(format!("Invalid upload URL TTL: {}", e)))?;

        self.media.insert_media(&record, BlobClaim::New).await?;

        tracing::info!(media_id = %record.id, "Upload ticket issued");
        Ok(UploadTicket {
            blob_key: record.blob_key.clone(),
            media: record,
            upload_url,
            expires_at,
        })
    }

    /// Cached read. The returned record carries a fresh presigned download URL
    /// unless it came from the cache, in which case the URL is at most
    /// `cache_ttl` old.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> AppResult<MediaRecord> {
        let key = media_cache_key(id);
        let lookup = self.cache.lookup(&key).await;

        if let Some(CacheLookup {
            value: Some(ref bytes),
            ..
        }) = lookup
        {
            match serde_json::from_slice::<MediaRecord>(bytes) {
                Ok(record) => {
                    tracing::debug!("Cache hit");
                    return Ok(record);
                }
                Err(e) => {
                    tracing::warn!(error = %e, key = %key, "Discarding undecodable cache entry");
                }
            }
        }

        let start = Instant::now();
        let mut record = self
            .media
            .get_media(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Media {} not found", id)))?;
        record.url = Some(
            self.storage
                .presigned_get_url(&record.blob_key, self.settings.download_url_ttl)
                .await?,
        );

        if let Some(lookup) = lookup {
            match serde_json::to_vec(&record) {
                Ok(bytes) => {
                    self.cache
                        .fill(&key, bytes, self.settings.cache_ttl, lookup.ticket)
                        .await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode media record for cache");
                }
            }
        }

        tracing::debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            "Media read from store"
        );
        Ok(record)
    }

    /// Read straight from the store and check ownership.
    async fn load_owned(&self, id: Uuid, caller: &str) -> AppResult<MediaRecord> {
        let record = self
            .media
            .get_media(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Media {} not found", id)))?;
        ensure_owner(&record, caller)?;
        Ok(record)
    }

    async fn apply_patch(&self, id: Uuid, patch: MediaPatch) -> AppResult<MediaRecord> {
        let update = self.media.update_media(id, &patch).await?;
        self.cache.invalidate(&media_cache_key(id)).await;
        if let Some(ref released) = update.released {
            delete_if_unreferenced(self.storage.as_ref(), released).await;
        }
        Ok(update.record)
    }

    /// Delete a media record. Its blob goes too once no copy or version shares it.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: Uuid, caller: &str) -> AppResult<()> {
        let record = self.get(id).await?;
        ensure_owner(&record, caller)?;

        let release = self
            .media
            .delete_media(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Media {} not found", id)))?;
        self.cache.invalidate(&media_cache_key(id)).await;
        delete_if_unreferenced(self.storage.as_ref(), &release).await;

        tracing::info!(
            blob_key = %release.blob_key,
            blob_refs_remaining = release.remaining,
            "Media deleted"
        );
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn rename(&self, id: Uuid, caller: &str, filename: &str) -> AppResult<MediaRecord> {
        validate_filename(filename)?;
        self.load_owned(id, caller).await?;
        let record = self.apply_patch(id, MediaPatch::rename(filename)).await?;
        tracing::info!(filename = %filename, "Media renamed");
        Ok(record)
    }

    /// Replace the metadata map.
    #[tracing::instrument(skip(self, metadata))]
    pub async fn update_metadata(
        &self,
        id: Uuid,
        caller: &str,
        metadata: HashMap<String, String>,
    ) -> AppResult<MediaRecord> {
        validate_metadata(&metadata)?;
        self.load_owned(id, caller).await?;
        self.apply_patch(id, MediaPatch::replace_metadata(metadata))
            .await
    }

    /// Reattribute a record to another workspace. Both workspaces' usage moves
    /// with the update.
    #[tracing::instrument(skip(self))]
    pub async fn move_to_workspace(
        &self,
        id: Uuid,
        caller: &str,
        workspace_id: &str,
    ) -> AppResult<MediaRecord> {
        validate_workspace(workspace_id)?;
        let record = self.load_owned(id, caller).await?;

        if self.settings.quota_enforcement
            && record.workspace_id.as_deref() != Some(workspace_id)
        {
            self.quotas
                .check_headroom(workspace_id, record.size_bytes)
                .await?;
        }

        let moved = self
            .apply_patch(id, MediaPatch::move_to(Some(workspace_id.to_string())))
            .await?;
        tracing::info!(
            from = ?record.workspace_id,
            to = %workspace_id,
            "Media moved"
        );
        Ok(moved)
    }

    /// New record with a new id sharing the source's blob.
    #[tracing::instrument(skip(self))]
    pub async fn copy(
        &self,
        id: Uuid,
        caller: &str,
        target_workspace: &str,
    ) -> AppResult<MediaRecord> {
        validate_workspace(target_workspace)?;
        let source = self.load_owned(id, caller).await?;

        if self.settings.quota_enforcement {
            self.quotas
                .check_headroom(target_workspace, source.size_bytes)
                .await?;
        }

        let now = Utc::now();
        let copy = MediaRecord {
            id: Uuid::new_v4(),
            workspace_id: Some(target_workspace.to_string()),
            url: None,
            created_at: now,
            updated_at: now,
            ..source
        };
        // Fails with NotFound when the source was deleted and its blob released meanwhile.
        self.media.insert_media(&copy, BlobClaim::Existing).await?;

        tracing::info!(copy_id = %copy.id, blob_key = %copy.blob_key, "Media copied");
        Ok(copy)
    }

    /// Delete each id independently. Ids left unattempted when `cancel` fires
    /// are reported as failed.
    #[tracing::instrument(skip(self, ids, cancel), fields(count = ids.len()))]
    pub async fn bulk_delete(
        &self,
        ids: &[Uuid],
        caller: &str,
        cancel: &CancellationToken,
    ) -> BulkOutcome {
        let outcome = run_bulk(ids, cancel, |id| self.delete(id, caller)).await;
        tracing::info!(
            succeeded = outcome.succeeded_count(),
            failed = outcome.failed_count(),
            cancelled = outcome.cancelled,
            "Bulk delete finished"
        );
        outcome
    }

    #[tracing::instrument(skip(self, ids, cancel), fields(count = ids.len()))]
    pub async fn bulk_move(
        &self,
        ids: &[Uuid],
        caller: &str,
        workspace_id: &str,
        cancel: &CancellationToken,
    ) -> BulkOutcome {
        let outcome = run_bulk(ids, cancel, |id| async move {
            self.move_to_workspace(id, caller, workspace_id).await.map(|_| ())
        })
        .await;
        tracing::info!(
            succeeded = outcome.succeeded_count(),
            failed = outcome.failed_count(),
            cancelled = outcome.cancelled,
            "Bulk move finished"
        );
        outcome
    }

    pub async fn list_for_owner(
        &self,
        owner_id: &str,
        limit: Option<i64>,
    ) -> AppResult<Vec<MediaRecord>> {
        self.media
            .list_media_by_owner(owner_id, None, clamp_limit(limit))
            .await
    }

    pub async fn list_by_type(
        &self,
        owner_id: &str,
        category: MediaCategory,
        limit: Option<i64>,
    ) -> AppResult<Vec<MediaRecord>> {
        self.media
            .list_media_by_owner(owner_id, Some(category), clamp_limit(limit))
            .await
    }

    /// Records attributed to the workspace, newest first, each with a fresh
    /// download URL.
    pub async fn list_by_workspace(
        &self,
        workspace_id: &str,
        limit: Option<i64>,
    ) -> AppResult<Vec<MediaRecord>> {
        validate_workspace(workspace_id)?;
        let records = self
            .media
            .list_media_by_workspace(workspace_id, clamp_limit(limit))
            .await?;
        let mut with_urls = Vec::with_capacity(records.len());
        for mut record in records {
            record.url = Some(
                self.storage
                    .presigned_get_url(&record.blob_key, self.settings.download_url_ttl)
                    .await?,
            );
            with_urls.push(record);
        }
        Ok(with_urls)
    }

    /// Fresh presigned download URL for the record's current blob.
    pub async fn download_url(&self, id: Uuid) -> AppResult<String> {
        let record = self
            .media
            .get_media(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Media {} not found", id)))?;
        Ok(self
            .storage
            .presigned_get_url(&record.blob_key, self.settings.download_url_ttl)
            .await?)
    }

    pub async fn stats_for_owner(&self, owner_id: &str) -> AppResult<MediaStats> {
        self.media.media_stats(owner_id).await
    }
}

pub(crate) fn ensure_owner(record: &MediaRecord, caller: &str) -> AppResult<()> {
    if record.is_owned_by(caller) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(format!(
            "Media {} belongs to another owner",
            record.id
        )))
    }
}

fn validate_workspace(workspace_id: &str) -> AppResult<()> {
    if workspace_id.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "Workspace id must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Run `op` for each id in order, checking `cancel` before each one. An item
/// already started always finishes.
pub(crate) async fn run_bulk<F, Fut>(ids: &[Uuid], cancel: &CancellationToken, op: F) -> BulkOutcome
where
    F: Fn(Uuid) -> Fut,
    Fut: std::future::Future<Output = AppResult<()>>,
{
    let mut outcome = BulkOutcome::default();
    for (index, &id) in ids.iter().enumerate() {
        if cancel.is_cancelled() {
            outcome.failed.extend_from_slice(&ids[index..]);
            outcome.cancelled = true;
            break;
        }
        match op(id).await {
            Ok(()) => outcome.succeeded.push(id),
            Err(e) => {
                tracing::warn!(error = %e, media_id = %id, "Bulk item failed");
                outcome.failed.push(id);
            }
        }
    }
    outcome
}
