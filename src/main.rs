mod cache;
mod config;
mod control_loop;
mod controllers;
mod domain;
mod error;
mod fieldbus;
mod logging;
mod messaging;
mod metrics;
mod safety;
mod store;
mod sync_manager;
mod watchdog;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use config::AppConfig;
use control_loop::ControlLoop;
use fieldbus::FieldbusTransport;
use logging::{init_tracing, shutdown_signal};
use messaging::MessagingClient;
use store::DurableStore;
use watchdog::Watchdog;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load().context("failed to load configuration")?;
    info!(site_id = %config.site.id, site_name = %config.site.name, "bess edge controller starting");

    let store = DurableStore::connect(&config.store.sqlite_path)
        .await
        .context("failed to open durable store")?;

    let fieldbus: Arc<dyn FieldbusTransport> = build_fieldbus(&config)?;

    let (messaging, eventloop) = MessagingClient::new(config.messaging.clone());
    let messaging = Arc::new(messaging);
    let (inbound_tx, mut inbound_rx) = tokio::sync::mpsc::channel(64);
    let messaging_driver = messaging.clone().run(eventloop, inbound_tx);
    let messaging_task = tokio::spawn(messaging_driver);

    tokio::spawn(async move {
        while let Some((topic, payload)) = inbound_rx.recv().await {
            info!(%topic, bytes = payload.len(), "inbound message received, ignoring (no hot-reload surface)");
        }
    });

    let watchdog = Arc::new(Watchdog::new(StdDuration::from_secs(
        config.control.watchdog_timeout_secs,
    )));
    let watchdog_task = watchdog.spawn(None::<fn(error::EdgeError)>);

    let control_loop = ControlLoop::new(config, fieldbus, store, messaging, watchdog);

    control_loop.run_until(shutdown_signal()).await?;

    watchdog_task.abort();
    messaging_task.abort();

    warn!("shutdown complete");
    Ok(())
}

fn build_fieldbus(config: &AppConfig) -> Result<Arc<dyn FieldbusTransport>> {
    #[cfg(feature = "modbus")]
    {
        if config.fieldbus.mode == "tcp" {
            let addr = config.fieldbus.socket_addr().context("invalid fieldbus address")?;
            let retry = fieldbus::modbus::RetryPolicy {
                retry_count: config.fieldbus.retry_count,
                retry_delay_ms: config.fieldbus.retry_delay_ms,
                timeout_ms: config.fieldbus.timeout_ms,
            };
            let register_map = match &config.fieldbus.register_map_path {
                Some(path) => fieldbus::RegisterMap::load_from_file(path)
                    .with_context(|| format!("failed to load register map from {}", path.display()))?,
                None => fieldbus::RegisterMap::default_map(),
            };
            return Ok(Arc::new(fieldbus::modbus::ModbusTransport::new(
                addr,
                config.fieldbus.unit_id,
                retry,
                register_map,
            )));
        }
    }
    warn!(mode = %config.fieldbus.mode, "falling back to an in-memory fieldbus stub for this mode");
    Ok(Arc::new(fieldbus::FakeFieldbus::new()))
}
