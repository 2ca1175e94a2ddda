//! Service bootstrap: CLI arguments and collaborator construction

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use common::config_loader::get_string_config;

use crate::config::{AppConfig, PersistenceConfig, TransportConfig, DEFAULT_CONFIG_PATH};
use crate::error::{PollSrvError, Result};
use crate::persistence::{MemoryPersistence, PersistenceProvider, RedisPersistence};
use crate::scheduler::PollingScheduler;
use crate::sensor_store::MemorySensorStore;
use crate::transport::{RtuTransport, SimulatedTransport, Transport};

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Scheduled register polling service
#[derive(Debug, Clone, Parser)]
#[clap(author, version, about)]
pub struct Args {
    /// Configuration file path
    #[clap(short, long, default_value = DEFAULT_CONFIG_PATH, env = "POLLSRV_CONFIG")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[clap(short = 'l', long, env = "RUST_LOG")]
    pub log_level: Option<String>,

    /// Only validate configuration without starting the service
    #[clap(long)]
    pub validate: bool,
}

/// Load and validate the configuration named by the arguments
pub fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::load(&args.config)?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

pub fn build_transport(config: &TransportConfig) -> Result<Box<dyn Transport>> {
    let transport: Box<dyn Transport> = match config {
        TransportConfig::Simulated => Box::new(SimulatedTransport::new()),
        TransportConfig::Rtu(rtu) => Box::new(
            RtuTransport::new(rtu.clone())
                .map_err(|e| PollSrvError::Config(format!("transport: {}", e)))?,
        ),
    };
    info!("Using {} transport", transport.name());
    Ok(transport)
}

pub async fn build_persistence(
    config: &PersistenceConfig,
) -> Result<Arc<dyn PersistenceProvider>> {
    match config {
        PersistenceConfig::Memory => {
            info!("Using in-memory persistence");
            Ok(Arc::new(MemoryPersistence::new()))
        },
        PersistenceConfig::Redis { url, prefix } => {
            let url = get_string_config(url.clone(), "REDIS_URL", DEFAULT_REDIS_URL);
            Ok(Arc::new(RedisPersistence::connect(&url, prefix).await?))
        },
    }
}

/// Wire transport, persistence and sensor store into a scheduler
///
/// Configured timers are not added here; see [`add_configured_timers`].
pub async fn build_scheduler(config: &AppConfig) -> Result<PollingScheduler> {
    let mut builder = PollingScheduler::builder()
        .boxed_transport(build_transport(&config.transport)?)
        .sensor_store(Arc::new(MemorySensorStore::new(config.sensors.clone())?));

    if let Some(persistence) = &config.persistence {
        builder = builder.persistence(build_persistence(persistence).await?);
    }
    Ok(builder.build())
}

/// Add the timers listed in the configuration
pub fn add_configured_timers(scheduler: &PollingScheduler, config: &AppConfig) -> Result<usize> {
    for timer in &config.timers {
        scheduler.add_timer(timer.clone())?;
    }
    Ok(config.timers.len())
}
