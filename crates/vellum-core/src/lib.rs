//! Vellum Core Library
//!
//! This crate provides core domain models, error types, configuration, and validation
//! that are shared across all Vellum components.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::{Config, LifecycleConfig, MAX_TRASH_RETENTION_DAYS};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::StorageBackend;
// Note: Storage, StorageError, StorageResult live in the vellum-storage crate

pub type AppResult<T> = Result<T, AppError>;
