//! Vellum Storage Library
//!
//! This crate provides the blob store abstraction and its implementations:
//! the `Storage` trait, an S3 backend and a local filesystem backend.
//!
//! # Blob key format
//!
//! All backends share one key layout, derived in the `keys` module:
//!
//! - **Current content**: `media/{owner}/{media_id}/current/{filename}`
//! - **Version content**: `media/{owner}/{media_id}/versions/{n}/{filename}`
//!
//! Every segment is percent-encoded, so no segment contains `/` and the mapping
//! from `(owner, media_id, version, filename)` to key is injective.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod signing;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::blob_key;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use signing::{SignedRequest, UrlSigner};
pub use traits::{Storage, StorageError, StorageResult};
pub use vellum_core::StorageBackend;
