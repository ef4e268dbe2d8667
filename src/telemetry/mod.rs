//! Telemetry for the bridge.
//!
//! Structured logging only; the bridge emits `tracing` events and leaves
//! metrics/export concerns to the embedding application.

mod logging;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
