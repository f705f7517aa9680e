use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Media category, derived from the MIME type prefix at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaCategory {
    /// `image/*`, `video/*` and `audio/*` map to their category; anything else is a document.
    pub fn from_mime_type(mime_type: &str) -> Self {
        let prefix = mime_type
            .split('/')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match prefix.as_str() {
            "image" => MediaCategory::Image,
            "video" => MediaCategory::Video,
            "audio" => MediaCategory::Audio,
            _ => MediaCategory::Document,
        }
    }
}

impl Display for MediaCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaCategory::Image => write!(f, "image"),
            MediaCategory::Video => write!(f, "video"),
            MediaCategory::Audio => write!(f, "audio"),
            MediaCategory::Document => write!(f, "document"),
        }
    }
}

impl FromStr for MediaCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaCategory::Image),
            "video" => Ok(MediaCategory::Video),
            "audio" => Ok(MediaCategory::Audio),
            "document" => Ok(MediaCategory::Document),
            _ => Err(anyhow::anyhow!("Invalid media category: {}", s)),
        }
    }
}

/// A media object's metadata record.
///
/// `url` is a transient presigned download URL populated on read; it is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MediaRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub workspace_id: Option<String>,
    pub category: MediaCategory,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub blob_key: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRecord {
    pub fn is_owned_by(&self, caller: &str) -> bool {
        self.owner_id == caller
    }

    /// Copy of the record with the transient URL cleared, as it is persisted.
    pub fn without_url(&self) -> Self {
        Self {
            url: None,
            ..self.clone()
        }
    }
}

/// Input for creating a media record.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct NewMedia {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Filename must be between 1 and 255 characters"
    ))]
    pub filename: String,
    #[validate(length(
        min = 1,
        max = 255,
        message = "MIME type must be between 1 and 255 characters"
    ))]
    pub mime_type: String,
    #[validate(range(min = 0, message = "Size must not be negative"))]
    pub size_bytes: i64,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Tri-state update for a nullable field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> FieldUpdate<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, FieldUpdate::Keep)
    }

    /// Apply the update to the current value.
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            FieldUpdate::Keep => current,
            FieldUpdate::Clear => None,
            FieldUpdate::Set(value) => Some(value),
        }
    }
}

/// Blob attributes a media record is repointed to when a version is restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobContent {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub blob_key: String,
}

/// Partial update of a media record. Absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct MediaPatch {
    pub filename: Option<String>,
    pub workspace_id: FieldUpdate<String>,
    /// Replaces the whole metadata map when present.
    pub metadata: Option<HashMap<String, String>>,
    pub content: Option<BlobContent>,
}

impl MediaPatch {
    pub fn rename(filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            ..Default::default()
        }
    }

    pub fn move_to(workspace_id: Option<String>) -> Self {
        Self {
            workspace_id: match workspace_id {
                Some(ws) => FieldUpdate::Set(ws),
                None => FieldUpdate::Clear,
            },
            ..Default::default()
        }
    }

    pub fn replace_metadata(metadata: HashMap<String, String>) -> Self {
        Self {
            metadata: Some(metadata),
            ..Default::default()
        }
    }

    pub fn repoint(content: BlobContent) -> Self {
        Self {
            content: Some(content),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.filename.is_none()
            && self.workspace_id.is_keep()
            && self.metadata.is_none()
            && self.content.is_none()
    }

    /// Apply the patch in memory, stamping `updated_at`.
    pub fn apply_to(&self, record: &mut MediaRecord, now: DateTime<Utc>) {
        if let Some(ref filename) = self.filename {
            record.filename = filename.clone();
        }
        record.workspace_id = self.workspace_id.clone().apply(record.workspace_id.take());
        if let Some(ref metadata) = self.metadata {
            record.metadata = metadata.clone();
        }
        if let Some(ref content) = self.content {
            record.filename = content.filename.clone();
            record.mime_type = content.mime_type.clone();
            record.size_bytes = content.size_bytes;
            record.blob_key = content.blob_key.clone();
            record.category = MediaCategory::from_mime_type(&content.mime_type);
        }
        record.updated_at = now;
    }
}

/// Result of `create_upload`: the new record plus a presigned PUT URL for its blob.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UploadTicket {
    pub media: MediaRecord,
    pub upload_url: String,
    pub blob_key: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CategoryStats {
    pub category: MediaCategory,
    pub count: i64,
    pub total_size: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MediaStats {
    pub total_files: i64,
    pub total_size: i64,
    pub by_category: Vec<CategoryStats>,
}

impl MediaStats {
    /// Build the totals from per-category rows.
    pub fn from_categories(mut by_category: Vec<CategoryStats>) -> Self {
        by_category.sort_by_key(|c| c.category.to_string());
        Self {
            total_files: by_category.iter().map(|c| c.count).sum(),
            total_size: by_category.iter().map(|c| c.total_size).sum(),
            by_category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MediaRecord {
        let now = Utc::now();
        MediaRecord {
            id: Uuid::new_v4(),
            owner_id: "u1".to_string(),
            workspace_id: Some("ws1".to_string()),
            category: MediaCategory::Image,
            filename: "cat.png".to_string(),
            mime_type: "image/png".to_string(),
            size_bytes: 2048,
            blob_key: "media/u1/x/current/cat.png".to_string(),
            metadata: HashMap::new(),
            url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn category_from_mime_prefix() {
        assert_eq!(MediaCategory::from_mime_type("image/png"), MediaCategory::Image);
        assert_eq!(MediaCategory::from_mime_type("video/mp4"), MediaCategory::Video);
        assert_eq!(MediaCategory::from_mime_type("audio/mpeg"), MediaCategory::Audio);
        assert_eq!(
            MediaCategory::from_mime_type("application/pdf"),
            MediaCategory::Document
        );
        assert_eq!(MediaCategory::from_mime_type("IMAGE/JPEG"), MediaCategory::Image);
    }

    #[test]
    fn empty_patch_detected() {
        assert!(MediaPatch::default().is_empty());
        assert!(!MediaPatch::rename("dog.png").is_empty());
        assert!(!MediaPatch::move_to(None).is_empty());
    }

    #[test]
    fn patch_leaves_unset_fields_untouched() {
        let mut record = sample();
        let before = record.clone();
        MediaPatch::rename("dog.png").apply_to(&mut record, Utc::now());
        assert_eq!(record.filename, "dog.png");
        assert_eq!(record.workspace_id, before.workspace_id);
        assert_eq!(record.blob_key, before.blob_key);
        assert_eq!(record.metadata, before.metadata);
    }

    #[test]
    fn patch_can_clear_workspace() {
        let mut record = sample();
        MediaPatch::move_to(None).apply_to(&mut record, Utc::now());
        assert_eq!(record.workspace_id, None);
    }

    #[test]
    fn repoint_rederives_category() {
        let mut record = sample();
        MediaPatch::repoint(BlobContent {
            filename: "clip.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            size_bytes: 99,
            blob_key: "media/u1/x/versions/1/clip.mp4".to_string(),
        })
        .apply_to(&mut record, Utc::now());
        assert_eq!(record.category, MediaCategory::Video);
        assert_eq!(record.size_bytes, 99);
    }

    #[test]
    fn url_is_not_serialized_when_absent() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("url").is_none());
    }
}
