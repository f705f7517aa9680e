//! Telemetry initialization
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and a fmt layer.

mod init_basic;

pub use init_basic::{init_telemetry, shutdown_telemetry, TelemetryOptions};
