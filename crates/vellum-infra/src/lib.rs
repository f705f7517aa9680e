//! Vellum Infrastructure Library
//!
//! Shared infrastructure components used by the lifecycle services and the worker:
//! - Telemetry initialization (tracing subscriber)
//! - Media record cache (cache-aside contract and in-process LRU backend)

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "cache")]
pub mod cache;

// Re-export commonly used types
#[cfg(feature = "cache")]
pub use cache::{
    CacheError, CacheLookup, CacheResult, FillTicket, GuardedCache, LruMediaCache, MediaCache,
};
#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry, TelemetryOptions};
