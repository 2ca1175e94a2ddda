//! Redis persistence
//!
//! Key layout:
//! - `{prefix}:readings:{sensor}` list of reading JSON, appended with RPUSH
//! - `{prefix}:item:{key}` string holding item JSON

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde_json::Value;
use std::time::Duration;
use tracing::info;

use super::traits::PersistenceProvider;
use crate::error::PersistenceError;
use crate::model::Reading;

pub const DEFAULT_KEY_PREFIX: &str = "pollsrv";

pub struct RedisPersistence {
    conn: ConnectionManager,
    url: String,
    prefix: String,
}

impl std::fmt::Debug for RedisPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPersistence")
            .field("url", &self.url)
            .field("prefix", &self.prefix)
            .field("conn", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisPersistence {
    /// Connect, giving up after 5 seconds
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, PersistenceError> {
        let client = Client::open(url)?;
        let conn = tokio::time::timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| {
                PersistenceError::Backend(format!(
                    "Redis connection to {} timed out after 5 seconds",
                    url
                ))
            })??;

        info!("Connected to Redis at {}", url);
        Ok(Self {
            conn,
            url: url.to_string(),
            prefix: prefix.to_string(),
        })
    }

    pub fn readings_key(&self, sensor: u8) -> String {
        readings_key(&self.prefix, sensor)
    }

    pub fn item_key(&self, key: &str) -> String {
        item_key(&self.prefix, key)
    }
}

fn readings_key(prefix: &str, sensor: u8) -> String {
    format!("{}:readings:{}", prefix, sensor)
}

fn item_key(prefix: &str, key: &str) -> String {
    format!("{}:item:{}", prefix, key)
}

#[async_trait]
impl PersistenceProvider for RedisPersistence {
    async fn save_sensor_reading(&self, reading: &Reading) -> Result<(), PersistenceError> {
        let payload = serde_json::to_string(reading)?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .rpush(self.readings_key(reading.sensor()), payload)
            .await?;
        Ok(())
    }

    async fn save_item(&self, key: &str, value: &Value) -> Result<(), PersistenceError> {
        let payload = serde_json::to_string(value)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set(self.item_key(key), payload).await?;
        Ok(())
    }

    async fn read_item(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(self.item_key(key)).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(PersistenceError::from))
            .transpose()
    }

    async fn sensor_readings(&self, sensor: u8) -> Result<Vec<Reading>, PersistenceError> {
        let mut conn = self.conn.clone();
        let payloads: Vec<String> = conn.lrange(self.readings_key(sensor), 0, -1).await?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(PersistenceError::from))
            .collect()
    }
}
