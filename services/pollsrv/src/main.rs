//! Polling service entry point

use clap::Parser;
use tracing::{error, info, warn};

use common::logging::{self, LogConfig};
use common::shutdown::wait_for_shutdown;
use pollsrv::bootstrap::{self, Args};
use pollsrv::error::PersistenceError;
use pollsrv::PollSrvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = bootstrap::load_config(&args)?;

    logging::init_with_config(&LogConfig {
        service_name: config.service.name.clone(),
        log_dir: config.logging.dir.clone(),
        level: config.logging.level.clone(),
        enable_json: config.logging.json,
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if args.validate {
        info!(
            "Configuration {} is valid: {} sensors, {} timers",
            args.config.display(),
            config.sensors.len(),
            config.timers.len()
        );
        return Ok(());
    }

    info!("Starting {}", config.service.name);
    let scheduler = bootstrap::build_scheduler(&config).await?;

    let mut restored = 0;
    if config.schedule.load_on_start {
        match scheduler.load().await {
            Ok(count) => {
                info!("Restored {} saved timers", count);
                restored = count;
            },
            Err(PollSrvError::Persistence(PersistenceError::NotFound(_))) => {
                info!("No saved schedule found")
            },
            Err(e) => error!("Failed to restore saved timers: {}", e),
        }
    }

    // Configured timers only seed an empty schedule
    if restored == 0 {
        let added = bootstrap::add_configured_timers(&scheduler, &config)?;
        info!("Added {} configured timers", added);
    }

    scheduler.start();

    let signal = wait_for_shutdown().await;
    info!("Shutdown signal received: {}", signal);

    scheduler.stop();
    if config.schedule.save_on_shutdown {
        if let Err(e) = scheduler.save().await {
            warn!("Failed to save schedule: {}", e);
        }
    }

    info!("{} stopped", config.service.name);
    Ok(())
}
