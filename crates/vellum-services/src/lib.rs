//! Vellum lifecycle services
//!
//! Coordinates the metadata store, the media cache and the blob store:
//! - [`MediaLifecycleService`]: create, cached read, mutation, copy and bulk operations
//! - [`VersionService`]: version chains and restore
//! - [`TrashService`] and [`TrashPurgeService`]: soft delete, recovery and expiry
//! - [`QuotaService`]: per-workspace storage limits
//! - [`ProcessingJobService`]: processing job bookkeeping
//!
//! Every handle is injected through the constructors; nothing here is global.

mod blobs;
pub mod jobs;
pub mod lifecycle;
pub mod purge;
pub mod quota;
pub mod settings;
pub mod trash;
pub mod versions;

pub use jobs::ProcessingJobService;
pub use lifecycle::MediaLifecycleService;
pub use purge::TrashPurgeService;
pub use quota::QuotaService;
pub use settings::LifecycleSettings;
pub use trash::TrashService;
pub use versions::VersionService;

use uuid::Uuid;
use vellum_core::constants::MEDIA_CACHE_PREFIX;

/// Cache key of a media record.
pub fn media_cache_key(id: Uuid) -> String {
    format!("{}{}", MEDIA_CACHE_PREFIX, id)
}
