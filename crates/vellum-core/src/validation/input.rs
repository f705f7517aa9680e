//! Input validation for media and version creation.

use std::collections::HashMap;

use validator::Validate;

use crate::error::AppError;
use crate::models::{NewMedia, NewVersion};

pub const MAX_FILENAME_LENGTH: usize = 255;
pub const MAX_METADATA_KEYS: usize = 50;
pub const MAX_METADATA_KEY_LENGTH: usize = 128;
pub const MAX_METADATA_VALUE_LENGTH: usize = 1024;

pub fn validate_filename(filename: &str) -> Result<(), AppError> {
    if filename.trim().is_empty() {
        return Err(AppError::InvalidInput("Filename must not be empty".to_string()));
    }
    if filename.chars().count() > MAX_FILENAME_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "Filename must be at most {} characters",
            MAX_FILENAME_LENGTH
        )));
    }
    if filename == "." || filename == ".." {
        return Err(AppError::InvalidInput(format!(
            "Invalid filename: {}",
            filename
        )));
    }
    if filename.chars().any(|c| c.is_control() || c == '/' || c == '\\') {
        return Err(AppError::InvalidInput(
            "Filename must not contain path separators or control characters".to_string(),
        ));
    }
    Ok(())
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$&-^_.+".contains(c)
}

/// Accepts `type/subtype` with optional `; parameters`.
pub fn validate_mime_type(mime_type: &str) -> Result<(), AppError> {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    let mut parts = essence.splitn(2, '/');
    let (kind, subtype) = match (parts.next(), parts.next()) {
        (Some(k), Some(s)) => (k, s),
        _ => {
            return Err(AppError::InvalidInput(format!(
                "Invalid MIME type: {}",
                mime_type
            )))
        }
    };
    if kind.is_empty()
        || subtype.is_empty()
        || !kind.chars().all(is_token_char)
        || !subtype.chars().all(is_token_char)
    {
        return Err(AppError::InvalidInput(format!(
            "Invalid MIME type: {}",
            mime_type
        )));
    }
    Ok(())
}

pub fn validate_metadata(metadata: &HashMap<String, String>) -> Result<(), AppError> {
    if metadata.len() > MAX_METADATA_KEYS {
        return Err(AppError::InvalidInput(format!(
            "Metadata may contain at most {} keys",
            MAX_METADATA_KEYS
        )));
    }
    for (key, value) in metadata {
        if key.is_empty() || key.len() > MAX_METADATA_KEY_LENGTH {
            return Err(AppError::InvalidInput(format!(
                "Metadata key must be between 1 and {} bytes",
                MAX_METADATA_KEY_LENGTH
            )));
        }
        if value.len() > MAX_METADATA_VALUE_LENGTH {
            return Err(AppError::InvalidInput(format!(
                "Metadata value for '{}' exceeds {} bytes",
                key, MAX_METADATA_VALUE_LENGTH
            )));
        }
    }
    Ok(())
}

pub fn validate_new_media(input: &NewMedia) -> Result<(), AppError> {
    input.validate()?;
    validate_filename(&input.filename)?;
    validate_mime_type(&input.mime_type)?;
    validate_metadata(&input.metadata)?;
    if let Some(ref ws) = input.workspace_id {
        if ws.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Workspace id must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

pub fn validate_new_version(input: &NewVersion) -> Result<(), AppError> {
    input.validate()?;
    validate_filename(&input.filename)?;
    validate_mime_type(&input.mime_type)
}
