//! Error handling for the polling service
//!
//! Each subsystem owns a small error enum; `PollSrvError` wraps them with the
//! sensor and register window that was being worked on.

use thiserror::Error;

use crate::model::{RegisterKind, ResultKind};

/// Read-group calculation errors
///
/// Per-group: a failed group never invalidates the reading it was computed from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalcError {
    /// Reading starts after the group's first register
    #[error(
        "{kind} group at {group_start} starts before reading window at {reading_start}"
    )]
    WindowTooLate {
        kind: ResultKind,
        group_start: u16,
        reading_start: u16,
    },

    /// Reading ends before the group's second register
    #[error(
        "{kind} group at {group_start} needs registers up to {needed}, reading window ends at {reading_end}"
    )]
    WindowTooShort {
        kind: ResultKind,
        group_start: u16,
        needed: u32,
        reading_end: i64,
    },

    /// Groups only apply to 16-bit word registers
    #[error("Reading type {0} should be holding or input")]
    UnsupportedRegisterKind(RegisterKind),
}

/// Transport layer errors
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Port could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No complete response within the transport timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Read/write on an open port failed
    #[error("IO error: {0}")]
    Io(String),

    /// Device answered with a Modbus exception
    #[error("Device exception: code 0x{code:02X}")]
    Exception { code: u8 },

    /// Response failed framing checks (id, function, length, CRC)
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Request cannot be expressed by this transport
    #[error("Unsupported request: {0}")]
    Unsupported(String),
}

/// Persistence collaborator errors
#[derive(Error, Debug, Clone)]
pub enum PersistenceError {
    /// Storage backend failure (connection, command)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Key does not exist
    #[error("Key not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for PersistenceError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Polling service error type
#[derive(Error, Debug, Clone)]
pub enum PollSrvError {
    /// Scheduler was built without a transport
    #[error("No transport configured")]
    NoTransport,

    /// A job asked to store readings but no persistence provider is attached
    #[error("No persistence provider configured")]
    NoPersistenceProvider,

    /// No job with this id
    #[error("Timer {0} not found")]
    TimerNotFound(u64),

    /// Job definition rejected at add time
    #[error("Invalid timer: {reason}")]
    InvalidTimer { reason: String },

    /// Transport transaction failed
    #[error("Read of sensor {sensor} {kind} [{start}; {length}] failed: {source}")]
    ReadFailed {
        sensor: u8,
        kind: RegisterKind,
        start: u16,
        length: u16,
        #[source]
        source: TransportError,
    },

    /// Persistence collaborator failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Schedule state could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration loading or validation
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for the polling service
pub type Result<T> = std::result::Result<T, PollSrvError>;

impl From<serde_json::Error> for PollSrvError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<figment::Error> for PollSrvError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}
