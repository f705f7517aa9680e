//! Store traits and their implementations
//!
//! The traits in [`traits`] are the seam the services depend on. [`postgres`] holds
//! the production repositories; [`memory`] an in-process store with the same
//! atomicity, used by tests.

pub mod traits;

pub mod postgres;

#[cfg(feature = "memory")]
pub mod memory;

pub mod pool;

pub use pool::{create_pool, run_migrations};
pub use postgres::{
    JobRepository, MediaRepository, QuotaRepository, TrashRepository, VersionRepository,
};
pub use traits::{
    BlobClaim, BlobRelease, JobStore, MediaStore, MediaUpdate, QuotaStore, TrashStore,
    VersionStore,
};

#[cfg(feature = "memory")]
pub use memory::MemoryStore;

use sqlx::PgPool;
use std::sync::Arc;

/// Handles to every store, injected into the services.
#[derive(Clone)]
pub struct Stores {
    pub media: Arc<dyn MediaStore>,
    pub versions: Arc<dyn VersionStore>,
    pub trash: Arc<dyn TrashStore>,
    pub quotas: Arc<dyn QuotaStore>,
    pub jobs: Arc<dyn JobStore>,
}

impl Stores {
    /// PostgreSQL repositories sharing one pool.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            media: Arc::new(MediaRepository::new(pool.clone())),
            versions: Arc::new(VersionRepository::new(pool.clone())),
            trash: Arc::new(TrashRepository::new(pool.clone())),
            quotas: Arc::new(QuotaRepository::new(pool.clone())),
            jobs: Arc::new(JobRepository::new(pool)),
        }
    }

    /// One backend implementing every store.
    pub fn from_backend<T>(backend: Arc<T>) -> Self
    where
        T: MediaStore + VersionStore + TrashStore + QuotaStore + JobStore + 'static,
    {
        Self {
            media: backend.clone(),
            versions: backend.clone(),
            trash: backend.clone(),
            quotas: backend.clone(),
            jobs: backend,
        }
    }
}
