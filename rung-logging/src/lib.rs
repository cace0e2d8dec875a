//! Logging for Rung
//!
//! Installs the global `tracing` subscriber and bridges the migrator's plain
//! text sinks onto tracing events.

pub mod init;
pub mod sinks;

pub use init::init_logging;
pub use sinks::{tracing_sinks, SINK_TARGET};
