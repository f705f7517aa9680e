//! Row types for FromRow decoding.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use std::collections::HashMap;
use uuid::Uuid;
use vellum_core::models::{
    JobStatus, JobType, MediaCategory, MediaRecord, MediaVersion, ProcessingJob, StorageQuota,
    TrashEntry,
};

pub(crate) const MEDIA_COLUMNS: &str = "id, owner_id, workspace_id, category, filename, mime_type, size_bytes, blob_key, metadata, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MediaRow {
    pub id: Uuid,
    pub owner_id: String,
    pub workspace_id: Option<String>,
    pub category: MediaCategory,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub blob_key: String,
    pub metadata: Json<HashMap<String, String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRow {
    pub fn into_record(self) -> MediaRecord {
        MediaRecord {
            id: self.id,
            owner_id: self.owner_id,
            workspace_id: self.workspace_id,
            category: self.category,
            filename: self.filename,
            mime_type: self.mime_type,
            size_bytes: self.size_bytes,
            blob_key: self.blob_key,
            metadata: self.metadata.0,
            url: None,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct VersionRow {
    pub id: Uuid,
    pub media_id: Uuid,
    pub version_number: i32,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub blob_key: String,
    pub uploaded_by: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl VersionRow {
    pub fn into_version(self) -> MediaVersion {
        MediaVersion {
            id: self.id,
            media_id: self.media_id,
            version_number: self.version_number,
            filename: self.filename,
            mime_type: self.mime_type,
            size_bytes: self.size_bytes,
            blob_key: self.blob_key,
            uploaded_by: self.uploaded_by,
            comment: self.comment,
            url: None,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TrashRow {
    pub id: Uuid,
    pub media_id: Uuid,
    pub owner_id: String,
    pub snapshot: Json<MediaRecord>,
    pub trashed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TrashRow {
    pub fn into_entry(self) -> TrashEntry {
        TrashEntry {
            id: self.id,
            media_id: self.media_id,
            owner_id: self.owner_id,
            snapshot: self.snapshot.0,
            trashed_at: self.trashed_at,
            expires_at: self.expires_at,
        }
    }
}

/// Quota limits joined with the usage ledger.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct QuotaRow {
    pub id: Uuid,
    pub workspace_id: String,
    pub max_storage_mb: i64,
    pub used_storage_bytes: i64,
    pub max_file_count: i64,
    pub current_file_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuotaRow {
    pub fn into_quota(self) -> StorageQuota {
        StorageQuota {
            id: self.id,
            workspace_id: self.workspace_id,
            max_storage_mb: self.max_storage_mb,
            used_storage_bytes: self.used_storage_bytes,
            max_file_count: self.max_file_count,
            current_file_count: self.current_file_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct JobRow {
    pub id: Uuid,
    pub media_id: Uuid,
    pub owner_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub params: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRow {
    pub fn into_job(self) -> ProcessingJob {
        ProcessingJob {
            id: self.id,
            media_id: self.media_id,
            owner_id: self.owner_id,
            job_type: self.job_type,
            status: self.status,
            params: self.params,
            result: self.result,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
