//! Exclusive access to the shared transport
//!
//! One transport, one permit: holding the guard means a transaction is in
//! flight. The guard is released on drop, so every exit path (success, error,
//! panic unwinding) hands the transport back.

use tokio::sync::{Mutex, MutexGuard};

use crate::transport::Transport;

#[derive(Debug)]
pub struct TransportSlot {
    name: String,
    transport: Mutex<Box<dyn Transport>>,
}

impl TransportSlot {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            name: transport.name().to_string(),
            transport: Mutex::new(transport),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait until no other transaction is in flight
    pub async fn acquire(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.transport.lock().await
    }
}
