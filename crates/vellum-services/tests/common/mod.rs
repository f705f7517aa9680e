#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use vellum_core::models::NewMedia;
use vellum_db::{MemoryStore, Stores};
use vellum_infra::cache::{
    CacheError, CacheLookup, CacheResult, FillTicket, GuardedCache, LruMediaCache, MediaCache,
};
use vellum_services::{
    LifecycleSettings, MediaLifecycleService, ProcessingJobService, QuotaService, TrashService,
    VersionService,
};
use vellum_storage::{LocalStorage, Storage, StorageBackend, StorageResult, UrlSigner};

pub const SIGNING_SECRET: &str = "test-signing-secret-that-is-long-enough";

/// Services wired over a `MemoryStore`, a `LocalStorage` in a temp directory
/// and the given cache.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub storage: Arc<RecordingStorage>,
    pub lifecycle: MediaLifecycleService,
    pub versions: VersionService,
    pub trash: TrashService,
    pub quotas: QuotaService,
    pub jobs: ProcessingJobService,
    pub settings: LifecycleSettings,
    _dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(LifecycleSettings::default(), Arc::new(LruMediaCache::new(128))).await
    }

    pub async fn with_settings(settings: LifecycleSettings) -> Self {
        Self::with(settings, Arc::new(LruMediaCache::new(128))).await
    }

    pub async fn with(settings: LifecycleSettings, cache: Arc<dyn MediaCache>) -> Self {
        Self::build(settings, cache, |stores| stores).await
    }

    /// Like [`Harness::with`] but lets the test swap individual stores.
    pub async fn build(
        settings: LifecycleSettings,
        cache: Arc<dyn MediaCache>,
        customize: impl FnOnce(Stores) -> Stores,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let local = LocalStorage::new(
            dir.path().join("blobs"),
            "http://localhost:3000/media".to_string(),
            UrlSigner::new(SIGNING_SECRET).unwrap(),
        )
        .await
        .unwrap();
        let storage = Arc::new(RecordingStorage::new(Arc::new(local)));

        let store = Arc::new(MemoryStore::new());
        let stores = customize(Stores::from_backend(store.clone()));
        let cache = GuardedCache::new(cache, Duration::from_secs(5));
        let blob_store: Arc<dyn Storage> = storage.clone();

        Self {
            lifecycle: MediaLifecycleService::new(
                &stores,
                blob_store.clone(),
                cache.clone(),
                settings.clone(),
            ),
            versions: VersionService::new(&stores, blob_store.clone(), cache.clone(), settings.clone()),
            trash: TrashService::new(&stores, blob_store, cache, settings.clone()),
            quotas: QuotaService::new(stores.quotas.clone()),
            jobs: ProcessingJobService::new(&stores),
            store,
            storage,
            settings,
            _dir: dir,
        }
    }
}

pub fn cat_png() -> NewMedia {
    NewMedia {
        filename: "cat.png".to_string(),
        mime_type: "image/png".to_string(),
        size_bytes: 2048,
        workspace_id: None,
        metadata: HashMap::new(),
    }
}

pub fn media_in(workspace: &str, filename: &str, size_bytes: i64) -> NewMedia {
    NewMedia {
        filename: filename.to_string(),
        mime_type: "application/pdf".to_string(),
        size_bytes,
        workspace_id: Some(workspace.to_string()),
        metadata: HashMap::new(),
    }
}

/// Storage wrapper that records deletes and can cancel a token on the first one.
pub struct RecordingStorage {
    inner: Arc<dyn Storage>,
    deleted: Mutex<Vec<String>>,
    cancel_on_delete: Mutex<Option<CancellationToken>>,
}

impl RecordingStorage {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            deleted: Mutex::new(Vec::new()),
            cancel_on_delete: Mutex::new(None),
        }
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn cancel_on_delete(&self, token: CancellationToken) {
        *self.cancel_on_delete.lock().unwrap() = Some(token);
    }
}

#[async_trait]
impl Storage for RecordingStorage {
    async fn presigned_put_url(
        &self,
        storage_key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.inner
            .presigned_put_url(storage_key, content_type, expires_in)
            .await
    }

    async fn presigned_get_url(
        &self,
        storage_key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.inner.presigned_get_url(storage_key, expires_in).await
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.deleted.lock().unwrap().push(storage_key.to_string());
        if let Some(token) = self.cancel_on_delete.lock().unwrap().take() {
            token.cancel();
        }
        self.inner.delete(storage_key).await
    }

    async fn put(&self, storage_key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()> {
        self.inner.put(storage_key, data, content_type).await
    }

    async fn get(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        self.inner.get(storage_key).await
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        self.inner.exists(storage_key).await
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}

/// Cache whose every call fails.
pub struct FailingCache;

#[async_trait]
impl MediaCache for FailingCache {
    async fn get(&self, _key: &str) -> CacheResult<CacheLookup> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn set(
        &self,
        _key: &str,
        _value: Vec<u8>,
        _ttl: Duration,
        _ticket: FillTicket,
    ) -> CacheResult<bool> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn invalidate(&self, _key: &str) -> CacheResult<()> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

/// LRU cache whose first fill parks until released, to hold a reader between
/// its store read and its cache write.
pub struct GatedCache {
    inner: LruMediaCache,
    gate_armed: Mutex<bool>,
    pub fill_started: Notify,
    pub release_fill: Notify,
}

impl GatedCache {
    pub fn new() -> Self {
        Self {
            inner: LruMediaCache::new(16),
            gate_armed: Mutex::new(true),
            fill_started: Notify::new(),
            release_fill: Notify::new(),
        }
    }
}

#[async_trait]
impl MediaCache for GatedCache {
    async fn get(&self, key: &str) -> CacheResult<CacheLookup> {
        self.inner.get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
        ticket: FillTicket,
    ) -> CacheResult<bool> {
        let gated = std::mem::replace(&mut *self.gate_armed.lock().unwrap(), false);
        if gated {
            self.fill_started.notify_one();
            self.release_fill.notified().await;
        }
        self.inner.set(key, value, ttl, ticket).await
    }

    async fn invalidate(&self, key: &str) -> CacheResult<()> {
        self.inner.invalidate(key).await
    }
}
