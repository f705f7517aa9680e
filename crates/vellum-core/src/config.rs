//! Configuration module
//!
//! Environment-driven configuration for the lifecycle layer: database pool,
//! blob store backend, presigned URL lifetimes, cache bounds, trash retention
//! and version/quota policy.

use std::env;

use crate::storage_types::StorageBackend;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const UPLOAD_URL_TTL_SECS: u64 = 15 * 60;
const DOWNLOAD_URL_TTL_SECS: u64 = 60 * 60;
const CACHE_TTL_SECS: u64 = 10 * 60;
const CACHE_CAPACITY: usize = 10_000;
const CACHE_OP_TIMEOUT_MS: u64 = 250;
const TRASH_RETENTION_DAYS: i64 = 30;
/// Upper bound on trash retention, ten years.
pub const MAX_TRASH_RETENTION_DAYS: i64 = 3650;
const TRASH_PURGE_INTERVAL_SECS: u64 = 60 * 60;
const TRASH_PURGE_BATCH_SIZE: i64 = 100;
const VERSION_MAX_ATTEMPTS: u32 = 16;
const MIN_SIGNING_SECRET_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    pub log_format: String,
    // Blob store
    pub storage_backend: Option<StorageBackend>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub url_signing_secret: Option<String>,
    // Presigned URL lifetimes
    pub upload_url_ttl_secs: u64,
    pub download_url_ttl_secs: u64,
    // Cache
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub cache_op_timeout_ms: u64,
    // Trash
    pub trash_retention_days: i64,
    /// Interval in seconds between purge sweeps. 0 = disabled.
    pub trash_purge_interval_secs: u64,
    pub trash_purge_batch_size: i64,
    // Versions and quotas
    pub version_max_attempts: u32,
    pub quota_enforcement: bool,
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl LifecycleConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from an arbitrary key lookup. Does not validate.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, anyhow::Error> {
        let storage_backend = match lookup("STORAGE_BACKEND") {
            Some(value) => Some(value.parse::<StorageBackend>()?),
            None => None,
        };

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;

        Ok(Self {
            database_url,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: parse_or(&lookup, "DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            log_format: lookup("LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
            storage_backend,
            s3_bucket: lookup("S3_BUCKET"),
            s3_region: lookup("S3_REGION"),
            s3_endpoint: lookup("S3_ENDPOINT"),
            aws_region: lookup("AWS_REGION"),
            local_storage_path: lookup("LOCAL_STORAGE_PATH"),
            local_storage_base_url: lookup("LOCAL_STORAGE_BASE_URL"),
            url_signing_secret: lookup("URL_SIGNING_SECRET"),
            upload_url_ttl_secs: parse_or(&lookup, "UPLOAD_URL_TTL_SECS", UPLOAD_URL_TTL_SECS),
            download_url_ttl_secs: parse_or(&lookup, "DOWNLOAD_URL_TTL_SECS", DOWNLOAD_URL_TTL_SECS),
            cache_ttl_secs: parse_or(&lookup, "CACHE_TTL_SECS", CACHE_TTL_SECS),
            cache_capacity: parse_or(&lookup, "CACHE_CAPACITY", CACHE_CAPACITY),
            cache_op_timeout_ms: parse_or(&lookup, "CACHE_OP_TIMEOUT_MS", CACHE_OP_TIMEOUT_MS),
            trash_retention_days: parse_or(&lookup, "TRASH_RETENTION_DAYS", TRASH_RETENTION_DAYS),
            trash_purge_interval_secs: parse_or(
                &lookup,
                "TRASH_PURGE_INTERVAL_SECS",
                TRASH_PURGE_INTERVAL_SECS,
            ),
            trash_purge_batch_size: parse_or(&lookup, "TRASH_PURGE_BATCH_SIZE", TRASH_PURGE_BATCH_SIZE),
            version_max_attempts: parse_or(&lookup, "VERSION_MAX_ATTEMPTS", VERSION_MAX_ATTEMPTS),
            quota_enforcement: parse_or(&lookup, "QUOTA_ENFORCEMENT", false),
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a PostgreSQL connection string"
            ));
        }

        if self.db_max_connections == 0 {
            return Err(anyhow::anyhow!("DB_MAX_CONNECTIONS must be greater than 0"));
        }

        // Validate storage backend configuration
        let backend = self.storage_backend.unwrap_or(StorageBackend::S3);
        match backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
                match self.url_signing_secret.as_deref() {
                    Some(secret) if secret.len() >= MIN_SIGNING_SECRET_LEN => {}
                    _ => {
                        return Err(anyhow::anyhow!(
                            "URL_SIGNING_SECRET must be at least {} characters when using local storage backend",
                            MIN_SIGNING_SECRET_LEN
                        ));
                    }
                }
            }
        }

        if self.upload_url_ttl_secs == 0 || self.download_url_ttl_secs == 0 {
            return Err(anyhow::anyhow!("Presigned URL TTLs must be greater than 0"));
        }

        // A cached record must never outlive the download URL embedded in it.
        if self.cache_ttl_secs >= self.download_url_ttl_secs {
            return Err(anyhow::anyhow!(
                "CACHE_TTL_SECS ({}) must be shorter than DOWNLOAD_URL_TTL_SECS ({})",
                self.cache_ttl_secs,
                self.download_url_ttl_secs
            ));
        }

        if self.cache_capacity == 0 {
            return Err(anyhow::anyhow!("CACHE_CAPACITY must be greater than 0"));
        }

        if self.trash_retention_days <= 0 || self.trash_retention_days > MAX_TRASH_RETENTION_DAYS {
            return Err(anyhow::anyhow!(
                "TRASH_RETENTION_DAYS must be between 1 and {}",
                MAX_TRASH_RETENTION_DAYS
            ));
        }

        if self.trash_purge_batch_size <= 0 {
            return Err(anyhow::anyhow!("TRASH_PURGE_BATCH_SIZE must be greater than 0"));
        }

        if self.version_max_attempts == 0 {
            return Err(anyhow::anyhow!("VERSION_MAX_ATTEMPTS must be at least 1"));
        }

        Ok(())
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<LifecycleConfig>);

impl Config {
    fn inner(&self) -> &LifecycleConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        self.inner().environment.eq_ignore_ascii_case("production")
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = LifecycleConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    pub fn database_url(&self) -> &str {
        &self.inner().database_url
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().db_timeout_seconds
    }

    pub fn environment(&self) -> &str {
        &self.inner().environment
    }

    pub fn json_logs(&self) -> bool {
        self.inner().log_format.eq_ignore_ascii_case("json")
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.inner().storage_backend.unwrap_or(StorageBackend::S3)
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.inner().s3_bucket.as_deref()
    }

    /// S3 region, falling back to `AWS_REGION`.
    pub fn s3_region(&self) -> Option<&str> {
        self.inner()
            .s3_region
            .as_deref()
            .or(self.inner().aws_region.as_deref())
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.inner().s3_endpoint.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.inner().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.inner().local_storage_base_url.as_deref()
    }

    pub fn url_signing_secret(&self) -> Option<&str> {
        self.inner().url_signing_secret.as_deref()
    }

    pub fn upload_url_ttl_secs(&self) -> u64 {
        self.inner().upload_url_ttl_secs
    }

    pub fn download_url_ttl_secs(&self) -> u64 {
        self.inner().download_url_ttl_secs
    }

    pub fn cache_ttl_secs(&self) -> u64 {
        self.inner().cache_ttl_secs
    }

    pub fn cache_capacity(&self) -> usize {
        self.inner().cache_capacity
    }

    pub fn cache_op_timeout_ms(&self) -> u64 {
        self.inner().cache_op_timeout_ms
    }

    pub fn trash_retention_days(&self) -> i64 {
        self.inner().trash_retention_days
    }

    pub fn trash_purge_interval_secs(&self) -> u64 {
        self.inner().trash_purge_interval_secs
    }

    pub fn trash_purge_batch_size(&self) -> i64 {
        self.inner().trash_purge_batch_size
    }

    pub fn version_max_attempts(&self) -> u32 {
        self.inner().version_max_attempts
    }

    pub fn quota_enforcement(&self) -> bool {
        self.inner().quota_enforcement
    }
}
