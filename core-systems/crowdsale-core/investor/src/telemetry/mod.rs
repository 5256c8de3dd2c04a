//! Process telemetry: structured logging.

pub mod logging;

pub use logging::{init, LoggingConfig, LoggingGuard};
