//! Service configuration
//!
//! Loaded from YAML, then overridden by `POLLSRV_` environment variables
//! (nested keys split on `__`, e.g. `POLLSRV_SCHEDULE__LOAD_ON_START=true`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{PollSrvError, Result};
use crate::model::Sensor;
use crate::persistence::redis::DEFAULT_KEY_PREFIX;
use crate::scheduler::PollJobConfig;
use crate::transport::RtuConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/pollsrv.yaml";
pub const ENV_PREFIX: &str = "POLLSRV_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "pollsrv".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Rolling log file directory; console only when unset
    pub dir: Option<PathBuf>,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            json: false,
        }
    }
}

/// Which transport owns the bus
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Random values, no hardware
    #[default]
    Simulated,
    /// Modbus RTU over a serial port
    Rtu(RtuConfig),
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PersistenceConfig {
    Memory,
    Redis {
        /// Falls back to `REDIS_URL`, then localhost
        #[serde(default)]
        url: Option<String>,
        #[serde(default = "default_key_prefix")]
        prefix: String,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Restore the saved job list before adding configured timers
    pub load_on_start: bool,
    /// Save the job list after stopping
    pub save_on_shutdown: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
    pub transport: TransportConfig,
    pub persistence: Option<PersistenceConfig>,
    pub sensors: Vec<Sensor>,
    pub timers: Vec<PollJobConfig>,
    pub schedule: ScheduleConfig,
}

impl AppConfig {
    /// Load from a YAML file (missing file means defaults) plus environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: AppConfig = Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            if !seen.insert(sensor.address) {
                return Err(PollSrvError::Config(format!(
                    "duplicate sensor address {}",
                    sensor.address
                )));
            }
            if let Some(group) = sensor
                .read_groups
                .iter()
                .find(|g| g.sensor_address != sensor.address)
            {
                return Err(PollSrvError::Config(format!(
                    "sensor {} has a read group at {} addressed to sensor {}",
                    sensor.address, group.start_location, group.sensor_address
                )));
            }
        }

        for timer in &self.timers {
            timer.validate()?;
            if timer.persist && self.persistence.is_none() {
                return Err(PollSrvError::Config(format!(
                    "timer for sensor {} stores readings but no persistence is configured",
                    timer.sensor_address
                )));
            }
        }

        let schedule_needs_store = self.schedule.load_on_start || self.schedule.save_on_shutdown;
        if schedule_needs_store && self.persistence.is_none() {
            return Err(PollSrvError::Config(
                "schedule load/save requires a persistence section".to_string(),
            ));
        }

        if let TransportConfig::Rtu(rtu) = &self.transport {
            rtu.validate()
                .map_err(|e| PollSrvError::Config(format!("transport: {}", e)))?;
        }
        Ok(())
    }
}
