//! Version Chain Manager
//!
//! Version numbers come from a per-media counter in the store that never goes
//! down, so a deleted version's number and blob key are never reused. The
//! store's uniqueness on `(media_id, version_number)` still guards the insert;
//! a taken number is skipped and a fresh one allocated.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use vellum_core::models::{BlobContent, MediaPatch, MediaRecord, MediaVersion, NewVersion};
use vellum_core::validation::validate_new_version;
use vellum_core::{AppError, AppResult};
use vellum_db::{MediaStore, Stores, VersionStore};
use vellum_infra::cache::GuardedCache;
use vellum_storage::Storage;

use crate::blobs::delete_if_unreferenced;
use crate::lifecycle::ensure_owner;
use crate::media_cache_key;
use crate::settings::LifecycleSettings;

#[derive(Clone)]
pub struct VersionService {
    media: Arc<dyn MediaStore>,
    versions: Arc<dyn VersionStore>,
    storage: Arc<dyn Storage>,
    cache: GuardedCache,
    settings: LifecycleSettings,
}

impl VersionService {
    pub fn new(
        stores: &Stores,
        storage: Arc<dyn Storage>,
        cache: GuardedCache,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            media: stores.media.clone(),
            versions: stores.versions.clone(),
            storage,
            cache,
            settings,
        }
    }

    async fn load_media(&self, media_id: Uuid) -> AppResult<MediaRecord> {
        self.media
            .get_media(media_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Media {} not found", media_id)))
    }

    async fn with_url(&self, mut version: MediaVersion) -> AppResult<MediaVersion> {
        version.url = Some(
            self.storage
                .presigned_get_url(&version.blob_key, self.settings.download_url_ttl)
                .await?,
        );
        Ok(version)
    }

    #[tracing::instrument(skip(self, input), fields(filename = %input.filename))]
    pub async fn create_version(
        &self,
        media_id: Uuid,
        caller: &str,
        input: NewVersion,
    ) -> AppResult<MediaVersion> {
        validate_new_version(&input)?;
        let media = self.load_media(media_id).await?;
        ensure_owner(&media, caller)?;

        let max_attempts = self.settings.version_max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let version_number = self.versions.next_version_number(media_id).await?;
            let version = MediaVersion {
                id: Uuid::new_v4(),
                media_id,
                version_number,
                filename: input.filename.clone(),
                mime_type: input.mime_type.clone(),
                size_bytes: input.size_bytes,
                blob_key: self.storage.blob_key(
                    &media.owner_id,
                    media_id,
                    Some(version_number),
                    &input.filename,
                ),
                uploaded_by: caller.to_string(),
                comment: input.comment.clone(),
                url: None,
                created_at: Utc::now(),
            };

            match self.versions.insert_version(&version).await {
                Ok(()) => {
                    tracing::info!(
                        version_id = %version.id,
                        version_number,
                        attempt,
                        "Version created"
                    );
                    return self.with_url(version).await;
                }
                Err(AppError::Conflict(_)) => {
                    tracing::debug!(version_number, attempt, "Version number taken, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(attempts = max_attempts, "Gave up allocating a version number");
        Err(AppError::Conflict(format!(
            "Could not allocate a version number for media {} after {} attempts",
            media_id, max_attempts
        )))
    }

    /// Newest first, each with a fresh download URL. Not cached.
    pub async fn list_versions(&self, media_id: Uuid) -> AppResult<Vec<MediaVersion>> {
        let versions = self.versions.list_versions(media_id).await?;
        let mut with_urls = Vec::with_capacity(versions.len());
        for version in versions {
            with_urls.push(self.with_url(version).await?);
        }
        Ok(with_urls)
    }

    pub async fn get_version(&self, version_id: Uuid) -> AppResult<MediaVersion> {
        let version = self
            .versions
            .get_version(version_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Version {} not found", version_id)))?;
        self.with_url(version).await
    }

    /// Only the uploader may delete a version.
    #[tracing::instrument(skip(self))]
    pub async fn delete_version(&self, version_id: Uuid, caller: &str) -> AppResult<()> {
        let version = self
            .versions
            .get_version(version_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Version {} not found", version_id)))?;
        if version.uploaded_by != caller {
            return Err(AppError::Unauthorized(format!(
                "Version {} was uploaded by another user",
                version_id
            )));
        }

        let release = self
            .versions
            .delete_version(version_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Version {} not found", version_id)))?;
        delete_if_unreferenced(self.storage.as_ref(), &release).await;

        tracing::info!(version_number = version.version_number, "Version deleted");
        Ok(())
    }

    /// Point the parent media at the version's content. No bytes are copied and
    /// no new version is created.
    #[tracing::instrument(skip(self))]
    pub async fn restore_version(&self, version_id: Uuid, caller: &str) -> AppResult<MediaRecord> {
        let version = self
            .versions
            .get_version(version_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Version {} not found", version_id)))?;
        let media = self.load_media(version.media_id).await?;
        ensure_owner(&media, caller)?;

        let patch = MediaPatch::repoint(BlobContent {
            filename: version.filename.clone(),
            mime_type: version.mime_type.clone(),
            size_bytes: version.size_bytes,
            blob_key: version.blob_key.clone(),
        });
        let update = self.media.update_media(media.id, &patch).await?;
        self.cache.invalidate(&media_cache_key(media.id)).await;
        if let Some(ref released) = update.released {
            delete_if_unreferenced(self.storage.as_ref(), released).await;
        }

        tracing::info!(
            media_id = %media.id,
            version_number = version.version_number,
            "Version restored"
        );
        Ok(update.record)
    }
}
