//! Transport contract
//!
//! A transport performs one request/response register read against one
//! addressed device. The scheduler guarantees it is never called concurrently
//! with itself, so implementations take `&mut self` and need no locking.

use async_trait::async_trait;
use std::fmt;

use crate::error::TransportError;
use crate::model::RegisterKind;

/// One register read transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub address: u8,
    pub kind: RegisterKind,
    pub start: u16,
    pub length: u16,
}

impl ReadRequest {
    pub fn new(address: u8, kind: RegisterKind, start: u16, length: u16) -> Self {
        Self {
            address,
            kind,
            start,
            length,
        }
    }
}

impl fmt::Display for ReadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sensor {} {} [{}; {}]",
            self.address, self.kind, self.start, self.length
        )
    }
}

/// Register read transport
///
/// Returns the register values in address order: one word per register for
/// holding/input, one 0/1 value per register for coil/inputDiscrete. The
/// caller stamps and wraps them into a `Reading`.
#[async_trait]
pub trait Transport: Send + fmt::Debug {
    /// Transport name for logging
    fn name(&self) -> &str;

    /// Perform one read transaction
    ///
    /// Must be bounded by the transport's own timeout; nothing above it
    /// cancels an in-flight transaction.
    async fn read(&mut self, request: ReadRequest) -> Result<Vec<u16>, TransportError>;
}
