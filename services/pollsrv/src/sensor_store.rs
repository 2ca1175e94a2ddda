//! Sensor configuration lookup
//!
//! The scheduler only needs read access to sensor definitions to decide which
//! read groups to calculate after a poll.

use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::error::{PollSrvError, Result};
use crate::model::Sensor;

pub trait SensorStore: Send + Sync + Debug {
    fn get_sensor_by_address(&self, address: u8) -> Option<Sensor>;
}

/// Sensor definitions loaded once from configuration
#[derive(Debug, Default)]
pub struct MemorySensorStore {
    sensors: BTreeMap<u8, Sensor>,
}

impl MemorySensorStore {
    /// Build from a list, rejecting duplicate addresses
    pub fn new(sensors: Vec<Sensor>) -> Result<Self> {
        let mut by_address = BTreeMap::new();
        for sensor in sensors {
            let address = sensor.address;
            if by_address.insert(address, sensor).is_some() {
                return Err(PollSrvError::Config(format!(
                    "duplicate sensor address {}",
                    address
                )));
            }
        }
        Ok(Self {
            sensors: by_address,
        })
    }
}

impl SensorStore for MemorySensorStore {
    fn get_sensor_by_address(&self, address: u8) -> Option<Sensor> {
        self.sensors.get(&address).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn sensor(address: u8) -> Sensor {
        Sensor {
            address,
            description: String::new(),
            registers: vec![],
            read_groups: vec![],
        }
    }

    #[test]
    fn test_lookup() {
        let store = MemorySensorStore::new(vec![sensor(5), sensor(2)]).unwrap();
        assert_eq!(store.get_sensor_by_address(5).unwrap().address, 5);
        assert_eq!(store.get_sensor_by_address(2).unwrap().address, 2);
        assert!(store.get_sensor_by_address(3).is_none());
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let err = MemorySensorStore::new(vec![sensor(1), sensor(1)]).unwrap_err();
        assert!(matches!(err, PollSrvError::Config(_)));
    }
}
