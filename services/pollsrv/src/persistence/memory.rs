//! In-memory persistence
//!
//! DashMap-backed; the default backend and the test double.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::traits::PersistenceProvider;
use crate::error::PersistenceError;
use crate::model::Reading;

#[derive(Debug, Default)]
pub struct MemoryPersistence {
    readings: DashMap<u8, Vec<Reading>>,
    items: DashMap<String, Value>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceProvider for MemoryPersistence {
    async fn save_sensor_reading(&self, reading: &Reading) -> Result<(), PersistenceError> {
        self.readings
            .entry(reading.sensor())
            .or_default()
            .push(reading.clone());
        Ok(())
    }

    async fn save_item(&self, key: &str, value: &Value) -> Result<(), PersistenceError> {
        self.items.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn read_item(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        Ok(self.items.get(key).map(|entry| entry.value().clone()))
    }

    async fn sensor_readings(&self, sensor: u8) -> Result<Vec<Reading>, PersistenceError> {
        Ok(self
            .readings
            .get(&sensor)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}
