//! Storage abstraction trait
//!
//! This module defines the Storage trait that all blob store backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;
use vellum_core::AppError;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Blob not found: {}", key)),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// The lifecycle layer never moves bytes itself: clients upload and download
/// through presigned URLs. `put`/`get` exist for local serving and tests.
///
/// `delete` is idempotent: deleting a missing key succeeds.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Derive the blob key for a media object or one of its versions.
    fn blob_key(
        &self,
        owner_id: &str,
        media_id: Uuid,
        version: Option<i32>,
        filename: &str,
    ) -> String {
        crate::keys::blob_key(owner_id, media_id, version, filename)
    }

    /// Generate a presigned PUT URL for a direct client upload.
    async fn presigned_put_url(
        &self,
        storage_key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// Generate a presigned GET URL for a direct client download.
    async fn presigned_get_url(&self, storage_key: &str, expires_in: Duration)
        -> StorageResult<String>;

    /// Delete a blob. Succeeds when the blob is already gone.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    async fn put(&self, storage_key: &str, data: Vec<u8>, content_type: &str)
        -> StorageResult<()>;

    async fn get(&self, storage_key: &str) -> StorageResult<Vec<u8>>;

    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
