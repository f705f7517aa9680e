//! Trash Registry
//!
//! Trashing moves a media record into a trash entry in one store transaction;
//! the blob and its reference stay with the entry until it is restored or
//! purged. Expiry is driven from outside by [`crate::TrashPurgeService`].

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;
use vellum_core::constants::{clamp_limit, MAX_LIST_LIMIT};
use vellum_core::models::{BulkOutcome, MediaRecord, TrashEntry};
use vellum_core::{AppError, AppResult};
use vellum_db::{MediaStore, Stores, TrashStore};
use vellum_infra::cache::GuardedCache;
use vellum_storage::Storage;

use crate::blobs::delete_if_unreferenced;
use crate::lifecycle::ensure_owner;
use crate::media_cache_key;
use crate::settings::LifecycleSettings;

#[derive(Clone)]
pub struct TrashService {
    media: Arc<dyn MediaStore>,
    trash: Arc<dyn TrashStore>,
    storage: Arc<dyn Storage>,
    cache: GuardedCache,
    settings: LifecycleSettings,
}

impl TrashService {
    pub fn new(
        stores: &Stores,
        storage: Arc<dyn Storage>,
        cache: GuardedCache,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            media: stores.media.clone(),
            trash: stores.trash.clone(),
            storage,
            cache,
            settings,
        }
    }

    /// Entries of other owners are reported as missing.
    async fn load_owned_entry(&self, trash_id: Uuid, caller: &str) -> AppResult<TrashEntry> {
        match self.trash.get_trash_entry(trash_id).await? {
            Some(entry) if entry.owner_id == caller => Ok(entry),
            _ => Err(AppError::NotFound(format!(
                "Trash entry {} not found",
                trash_id
            ))),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn move_to_trash(&self, media_id: Uuid, caller: &str) -> AppResult<TrashEntry> {
        let media = self
            .media
            .get_media(media_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Media {} not found", media_id)))?;
        ensure_owner(&media, caller)?;

        let entry = self
            .trash
            .trash_media(media_id, Utc::now(), self.settings.trash_retention)
            .await?;
        self.cache.invalidate(&media_cache_key(media_id)).await;

        tracing::info!(
            trash_id = %entry.id,
            expires_at = %entry.expires_at,
            "Media moved to trash"
        );
        Ok(entry)
    }

    /// Re-create the media record under its original id.
    #[tracing::instrument(skip(self))]
    pub async fn restore(&self, trash_id: Uuid, caller: &str) -> AppResult<MediaRecord> {
        self.load_owned_entry(trash_id, caller).await?;

        let record = self.trash.restore_trash_entry(trash_id).await?;
        self.cache.invalidate(&media_cache_key(record.id)).await;

        tracing::info!(media_id = %record.id, "Media restored from trash");
        Ok(record)
    }

    /// Newest first.
    pub async fn list(&self, caller: &str, limit: Option<i64>) -> AppResult<Vec<TrashEntry>> {
        self.trash.list_trash(caller, clamp_limit(limit)).await
    }

    async fn purge(&self, trash_id: Uuid) -> AppResult<bool> {
        match self.trash.purge_trash_entry(trash_id).await? {
            Some(release) => {
                delete_if_unreferenced(self.storage.as_ref(), &release).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn permanent_delete(&self, trash_id: Uuid, caller: &str) -> AppResult<()> {
        self.load_owned_entry(trash_id, caller).await?;
        if !self.purge(trash_id).await? {
            return Err(AppError::NotFound(format!(
                "Trash entry {} not found",
                trash_id
            )));
        }
        tracing::info!("Trash entry permanently deleted");
        Ok(())
    }

    /// Purge every entry of `caller`, best effort per entry.
    #[tracing::instrument(skip(self))]
    pub async fn empty(&self, caller: &str) -> AppResult<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        let mut attempted = HashSet::new();

        loop {
            let page = self.trash.list_trash(caller, MAX_LIST_LIMIT).await?;
            let fresh: Vec<TrashEntry> = page
                .into_iter()
                .filter(|entry| attempted.insert(entry.id))
                .collect();
            if fresh.is_empty() {
                break;
            }

            for entry in fresh {
                match self.purge(entry.id).await {
                    Ok(_) => outcome.succeeded.push(entry.id),
                    Err(e) => {
                        tracing::warn!(error = %e, trash_id = %entry.id, "Failed to purge trash entry");
                        outcome.failed.push(entry.id);
                    }
                }
            }
        }

        tracing::info!(
            succeeded = outcome.succeeded_count(),
            failed = outcome.failed_count(),
            "Trash emptied"
        );
        Ok(outcome)
    }

    /// Soonest expiry first.
    pub async fn list_expired(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<TrashEntry>> {
        self.trash.list_expired_trash(now, limit).await
    }

    /// Purge up to `limit` entries expired at `now`.
    #[tracing::instrument(skip(self))]
    pub async fn purge_expired(&self, now: DateTime<Utc>, limit: i64) -> AppResult<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        for entry in self.trash.list_expired_trash(now, limit).await? {
            match self.purge(entry.id).await {
                Ok(true) => {
                    tracing::debug!(
                        trash_id = %entry.id,
                        media_id = %entry.media_id,
                        expires_at = %entry.expires_at,
                        "Purged expired trash entry"
                    );
                    outcome.succeeded.push(entry.id);
                }
                // Restored or purged concurrently.
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(error = %e, trash_id = %entry.id, "Failed to purge expired trash entry");
                    outcome.failed.push(entry.id);
                }
            }
        }
        Ok(outcome)
    }
}
