use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// One immutable entry in a media object's version chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MediaVersion {
    pub id: Uuid,
    pub media_id: Uuid,
    /// Positive and strictly increasing per media, starting at 1.
    pub version_number: i32,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub blob_key: String,
    pub uploaded_by: String,
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct NewVersion {
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
    #[validate(length(max = 1000, message = "Comment must be at most 1000 characters"))]
    pub comment: Option<String>,
}
