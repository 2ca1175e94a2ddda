//! Time provider abstraction
//!
//! Separates wall-clock acquisition from scheduling logic so catch-up and
//! tick-boundary computations can be tested against a fixed instant.

use chrono::{DateTime, Utc};

/// Time provider trait for wall-clock timestamps
///
/// - `SystemTimeProvider` for production use
/// - `FixedTimeProvider` for deterministic tests
pub trait TimeProvider: Send + Sync + 'static {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;
}

/// System time provider using the local clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Time provider frozen at one instant
#[derive(Clone, Copy, Debug)]
pub struct FixedTimeProvider {
    instant: DateTime<Utc>,
}

impl FixedTimeProvider {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }
}

impl TimeProvider for FixedTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        self.instant
    }
}
