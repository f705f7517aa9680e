//! PostgreSQL implementations of the store traits.

mod job;
mod ledger;
mod media;
mod quota;
mod rows;
mod trash;
mod version;

pub use job::JobRepository;
pub use media::MediaRepository;
pub use quota::QuotaRepository;
pub use trash::TrashRepository;
pub use version::VersionRepository;
