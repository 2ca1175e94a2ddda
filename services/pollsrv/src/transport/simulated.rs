//! Simulated transport for running without a bus
//!
//! Answers every read with random values of the right shape: 0/1 for bit
//! tables, full 16-bit words otherwise.

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use super::traits::{ReadRequest, Transport};
use crate::error::TransportError;

#[derive(Debug, Default)]
pub struct SimulatedTransport;

impl SimulatedTransport {
    pub fn new() -> Self {
        Self
    }

    fn random_values(request: &ReadRequest) -> Vec<u16> {
        let mut rng = rand::thread_rng();
        (0..request.length)
            .map(|_| {
                if request.kind.is_bit() {
                    rng.gen_range(0..=1)
                } else {
                    rng.gen()
                }
            })
            .collect()
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn read(&mut self, request: ReadRequest) -> Result<Vec<u16>, TransportError> {
        let values = Self::random_values(&request);
        debug!("Simulated read {} -> {} values", request, values.len());
        Ok(values)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::model::RegisterKind;

    #[tokio::test]
    async fn test_values_match_request_shape() {
        let mut transport = SimulatedTransport::new();

        let words = transport
            .read(ReadRequest::new(1, RegisterKind::Holding, 0, 12))
            .await
            .unwrap();
        assert_eq!(words.len(), 12);

        let bits = transport
            .read(ReadRequest::new(1, RegisterKind::Coil, 0, 40))
            .await
            .unwrap();
        assert_eq!(bits.len(), 40);
        assert!(bits.iter().all(|b| *b <= 1));
    }
}
