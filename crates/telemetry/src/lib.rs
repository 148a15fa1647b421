//! Telemetry for the purge engine: structured logging, in-process metrics,
//! component health and the process memory guard.

pub mod health;
pub mod memory;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use memory::*;
pub use metrics::*;
pub use tracing_setup::*;
