//! Shared service bootstrap library
//!
//! Provides the pieces every polling service needs before its own logic runs:
//! - logging initialisation (console + rolling file)
//! - configuration value fallbacks (config file > ENV > default)
//! - graceful shutdown signal handling
//! - an injectable wall clock

pub mod config_loader;
pub mod logging;
pub mod shutdown;
pub mod time;

pub use logging::LogConfig;
pub use time::{FixedTimeProvider, SystemTimeProvider, TimeProvider};

// Re-export common dependencies
pub use chrono;
pub use tokio;
