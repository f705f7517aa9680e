//! Validation modules

pub mod input;

pub use input::{
    validate_filename, validate_metadata, validate_mime_type, validate_new_media,
    validate_new_version, MAX_FILENAME_LENGTH, MAX_METADATA_KEYS, MAX_METADATA_KEY_LENGTH,
    MAX_METADATA_VALUE_LENGTH,
};
