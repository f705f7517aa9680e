//! Data models for the lifecycle layer
//!
//! Media records, version chains, trash entries, quotas, processing jobs and
//! bulk-operation outcomes.

mod bulk;
mod job;
mod media;
mod quota;
mod trash;
mod version;

pub use bulk::*;
pub use job::*;
pub use media::*;
pub use quota::*;
pub use trash::*;
pub use version::*;
