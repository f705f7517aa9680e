use crate::keys::validate_key;
use crate::signing::{SignedRequest, UrlSigner};
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
///
/// Presigned URLs point at `base_url` and carry an HMAC signature that the
/// serving layer checks with [`LocalStorage::verify_signed_url`].
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
    signer: UrlSigner,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for blob storage (e.g., "/var/lib/vellum/media")
    /// * `base_url` - Base URL for serving blobs (e.g., "http://localhost:3000/media")
    /// * `signer` - Signs and verifies presigned URLs
    pub async fn new(
        base_path: impl Into<PathBuf>,
        base_url: String,
        signer: UrlSigner,
    ) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
            signer,
        })
    }

    /// Convert storage key to filesystem path with security validation
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        validate_key(storage_key)?;

        let path = self.base_path.join(storage_key);
        if path.strip_prefix(&self.base_path).is_err() {
            return Err(StorageError::InvalidKey(
                "Storage key resolves outside storage directory".to_string(),
            ));
        }

        Ok(path)
    }

    fn signed_url(
        &self,
        method: &str,
        storage_key: &str,
        content_type: Option<&str>,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.key_to_path(storage_key)?;
        let (expires, signature) = self
            .signer
            .sign(method, storage_key, content_type, expires_in)?;

        let mut url = format!(
            "{}/{}?method={}&expires={}&signature={}",
            self.base_url.trim_end_matches('/'),
            storage_key,
            method,
            expires,
            signature
        );
        if let Some(ct) = content_type {
            url.push_str("&content_type=");
            url.push_str(&urlencoding::encode(ct));
        }
        Ok(url)
    }

    /// Check a signed request presented to the serving layer.
    pub fn verify_signed_url(&self, request: &SignedRequest<'_>) -> StorageResult<()> {
        validate_key(request.storage_key)?;
        self.signer.verify(request)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn presigned_put_url(
        &self,
        storage_key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.signed_url("PUT", storage_key, Some(content_type), expires_in)
    }

    async fn presigned_get_url(
        &self,
        storage_key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.signed_url("GET", storage_key, None, expires_in)
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let path = self.key_to_path(storage_key)?;
        let start = std::time::Instant::now();

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(key = %storage_key, "Local storage delete of missing blob");
                return Ok(());
            }
            Err(e) => {
                return Err(StorageError::DeleteFailed(format!(
                    "Failed to delete file {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn put(&self, storage_key: &str, data: Vec<u8>, _content_type: &str) -> StorageResult<()> {
        let path = self.key_to_path(storage_key)?;
        let size = data.len();

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(())
    }

    async fn get(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        let path = self.key_to_path(storage_key)?;
        let start = std::time::Instant::now();

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(storage_key.to_string()));
            }
            Err(e) => {
                return Err(StorageError::DownloadFailed(format!(
                    "Failed to read file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        tracing::debug!(
            path = %path.display(),
            key = %storage_key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage download successful"
        );

        Ok(data)
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(storage_key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use crate::keys::blob_key;
    use tempfile::tempdir;
    use uuid::Uuid;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    async fn storage(dir: &Path) -> LocalStorage {
        LocalStorage::new(
            dir,
            "http://localhost:3000/media".to_string(),
            UrlSigner::new(SECRET).unwrap(),
        )
        .await
        .unwrap()
    }

    fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or_default();
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix(&format!("{}=", name)))
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_local_storage_put_get() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let key = blob_key("u1", Uuid::new_v4(), None, "test.txt");
        let data = b"test data".to_vec();
        storage.put(&key, data.clone(), "text/plain").await.unwrap();

        assert_eq!(storage.get(&key).await.unwrap(), data);
        assert!(storage.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_current_blob_and_versions_coexist() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let id = Uuid::new_v4();

        // A current file named like a version directory.
        let current = blob_key("u1", id, None, "v1");
        let version = blob_key("u1", id, Some(1), "x.png");
        storage.put(&current, b"current".to_vec(), "text/plain").await.unwrap();
        storage.put(&version, b"version".to_vec(), "image/png").await.unwrap();

        assert_eq!(storage.get(&current).await.unwrap(), b"current".to_vec());
        assert_eq!(storage.get(&version).await.unwrap(), b"version".to_vec());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let result = storage.get("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.delete("media/../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.exists("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_dotted_filenames_are_not_traversal() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        storage
            .put("media/u1/..hidden", b"x".to_vec(), "text/plain")
            .await
            .unwrap();
        assert!(storage.exists("media/u1/..hidden").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let key = blob_key("u1", Uuid::new_v4(), None, "gone.txt");
        storage.put(&key, b"bye".to_vec(), "text/plain").await.unwrap();

        storage.delete(&key).await.unwrap();
        assert!(!storage.exists(&key).await.unwrap());
        storage.delete(&key).await.unwrap();
        assert!(matches!(
            storage.get(&key).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_presigned_get_url_verifies() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let key = blob_key("u1", Uuid::new_v4(), None, "cat.png");

        let url = storage
            .presigned_get_url(&key, Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:3000/media/media/u1/"));

        let expires: u64 = query_param(&url, "expires").parse().unwrap();
        let signature = query_param(&url, "signature");
        storage
            .verify_signed_url(&SignedRequest {
                method: "GET",
                storage_key: &key,
                expires,
                content_type: None,
                signature,
            })
            .unwrap();

        // A GET URL is not a PUT URL.
        let as_put = storage.verify_signed_url(&SignedRequest {
            method: "PUT",
            storage_key: &key,
            expires,
            content_type: None,
            signature,
        });
        assert!(matches!(as_put, Err(StorageError::InvalidSignature(_))));
    }

    #[tokio::test]
    async fn test_presigned_put_url_binds_content_type() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let key = blob_key("u1", Uuid::new_v4(), None, "cat.png");

        let url = storage
            .presigned_put_url(&key, "image/png", Duration::from_secs(900))
            .await
            .unwrap();
        assert_eq!(query_param(&url, "method"), "PUT");
        assert_eq!(query_param(&url, "content_type"), "image%2Fpng");

        let expires: u64 = query_param(&url, "expires").parse().unwrap();
        storage
            .verify_signed_url(&SignedRequest {
                method: "PUT",
                storage_key: &key,
                expires,
                content_type: Some("image/png"),
                signature: query_param(&url, "signature"),
            })
            .unwrap();
    }
}
