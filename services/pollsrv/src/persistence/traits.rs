//! Persistence collaborator contract

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

use crate::error::PersistenceError;
use crate::model::Reading;

/// Storage for sensor readings and generic keyed items
///
/// Items are opaque JSON documents; the scheduler uses one well-known key
/// for its job list.
#[async_trait]
pub trait PersistenceProvider: Send + Sync + Debug {
    /// Append one reading to its sensor's history
    async fn save_sensor_reading(&self, reading: &Reading) -> Result<(), PersistenceError>;

    /// Store (or replace) an item
    async fn save_item(&self, key: &str, value: &Value) -> Result<(), PersistenceError>;

    /// Fetch an item; `None` when the key was never saved
    async fn read_item(&self, key: &str) -> Result<Option<Value>, PersistenceError>;

    /// Stored readings for one sensor, oldest first
    async fn sensor_readings(&self, sensor: u8) -> Result<Vec<Reading>, PersistenceError>;
}
