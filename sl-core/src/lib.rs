//! ScanLink Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by the other ScanLink crates:
//! - Client configuration (server URL, reconnect policy, default channels)
//! - A unified error type
//! - Structured logging with tracing
//! - Platform data/config directories
//! - Protocol constants

pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod constants;

// Re-export commonly used items at the crate root
pub use config::AppConfig;
pub use error::{SlError, SlResult};
pub use logging::{init_logging, LogGuard};
