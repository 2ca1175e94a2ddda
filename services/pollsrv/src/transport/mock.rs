//! Scripted transport for tests
//!
//! Clones share state, so a test can keep one handle while the scheduler owns
//! another. Every call records when it entered and left the transport.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::traits::{ReadRequest, Transport};
use crate::error::TransportError;

/// One recorded transaction
#[derive(Debug, Clone)]
pub struct MockCall {
    pub request: ReadRequest,
    pub entered: Instant,
    pub exited: Instant,
}

#[derive(Debug, Default)]
struct MockState {
    script: Mutex<VecDeque<Result<Vec<u16>, TransportError>>>,
    calls: Mutex<Vec<MockCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
    delay: Duration,
}

impl MockTransport {
    /// Answers every read with zeros once the script is exhausted
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold each transaction open for `delay`
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Queue the result of the next unscripted call
    pub fn push_result(&self, result: Result<Vec<u16>, TransportError>) {
        self.state.script.lock().push_back(result);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().len()
    }

    /// Highest number of transactions ever observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn read(&mut self, request: ReadRequest) -> Result<Vec<u16>, TransportError> {
        let entered = Instant::now();
        let now_in_flight = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_in_flight
            .fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.state.script.lock().pop_front();
        let result =
            scripted.unwrap_or_else(|| Ok(vec![0; usize::from(request.length)]));

        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.state.calls.lock().push(MockCall {
            request,
            entered,
            exited: Instant::now(),
        });
        result
    }
}
