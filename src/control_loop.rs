use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Timelike, Utc};
use tracing::{error, info, warn};

use crate::cache::CacheManager;
use crate::config::AppConfig;
use crate::controllers::black_start::BlackStartController;
use crate::controllers::decision_engine::{DecisionEngine, SiteInputs};
use crate::controllers::{ArbitrageController, PeakShavingController, SolarSelfConsumptionController};
use crate::domain::Action;
use crate::fieldbus::FieldbusTransport;
use crate::messaging::{MessageQos, MessagingClient};
use crate::metrics;
use crate::safety::SafetyManager;
use crate::store::{DurableStore, RetentionPolicy};
use crate::sync_manager::SyncManager;
use crate::watchdog::Watchdog;

/// How many cycles elapse between housekeeping passes (retention sweep,
/// cache-staleness logging). Housekeeping is cheap but pointless to run
/// every 5s cycle.
const HOUSEKEEPING_EVERY_N_CYCLES: u64 = 720;

/// Ties every component together and drives the periodic cycle
/// described in the design: read, check, decide, write, persist,
/// publish, heartbeat, sleep. Owns every shared resource by value or by
/// `Arc`; nothing here is a module-level singleton.
pub struct ControlLoop {
    config: AppConfig,
    fieldbus: Arc<dyn FieldbusTransport>,
    store: DurableStore,
    messaging: Arc<MessagingClient>,
    cache: CacheManager,
    safety: SafetyManager,
    black_start: BlackStartController,
    decision_engine: DecisionEngine,
    watchdog: Arc<Watchdog>,
    cycle_count: u64,
}

impl ControlLoop {
    pub fn new(
        config: AppConfig,
        fieldbus: Arc<dyn FieldbusTransport>,
        store: DurableStore,
        messaging: Arc<MessagingClient>,
        watchdog: Arc<Watchdog>,
    ) -> Self {
        let decision_engine = DecisionEngine::new(
            ArbitrageController::new(config.arbitrage.clone()),
            PeakShavingController::new(config.peak_shaving.clone()),
            SolarSelfConsumptionController::new(config.solar.clone()),
        );
        Self {
            config,
            fieldbus,
            store,
            messaging,
            cache: CacheManager::new(),
            safety: SafetyManager::new(),
            black_start: BlackStartController::new(),
            decision_engine,
            watchdog,
            cycle_count: 0,
        }
    }

    pub fn cache_mut(&mut self) -> &mut CacheManager {
        &mut self.cache
    }

    /// Runs cycles forever at `sample_interval_secs` cadence until the
    /// given future resolves, then performs the shutdown sequence:
    /// finish the in-flight cycle, publish offline status, flush and
    /// close the durable store.
    pub async fn run_until(mut self, shutdown: impl std::future::Future<Output = ()>) -> anyhow::Result<()> {
        tokio::pin!(shutdown);
        let period = StdDuration::from_secs(self.config.control.sample_interval_secs);
        loop {
            let cycle_start = tokio::time::Instant::now();
            tokio::select! {
                _ = &mut shutdown => {
                    info!("control loop shutting down");
                    break;
                }
                result = self.run_cycle() => {
                    if let Err(e) = result {
                        error!(error = %e, "control cycle failed");
                    }
                }
            }
            if self.cycle_count % HOUSEKEEPING_EVERY_N_CYCLES == 0 {
                self.run_housekeeping().await;
            }
            let elapsed = cycle_start.elapsed();
            if elapsed < period {
                tokio::time::sleep(period - elapsed).await;
            }
        }
        self.shutdown().await;
        Ok(())
    }

    /// One pass through the full pipeline. Returns `Ok(())` even when
    /// telemetry could not be read: a missing reading feeds the
    /// watchdog and records the failure, it does not abort the loop.
    pub async fn run_cycle(&mut self) -> anyhow::Result<()> {
        self.cycle_count += 1;
        let now = Utc::now();

        let snap = match self.fieldbus.read_telemetry().await {
            Ok(Some(snap)) => snap,
            Ok(None) => {
                warn!("fieldbus returned no telemetry this cycle");
                metrics::record_fieldbus_error("telemetry");
                self.watchdog.heartbeat();
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, "fieldbus read failed");
                metrics::record_fieldbus_error("telemetry");
                self.watchdog.heartbeat();
                return Ok(());
            }
        };

        self.store.append_telemetry(&snap).await?;

        let safety = self.safety.check(&snap);
        if !safety.is_ok() {
            metrics::record_safety_violation(&safety.action.to_string());
            self.store
                .append_alarm(now, "critical", "safety", &safety.reason, None)
                .await?;
        }

        let (grid_status, events) = self
            .black_start
            .process(
                self.fieldbus.as_ref(),
                snap.grid_frequency_hz,
                snap.grid_voltage_v,
                snap.soc_percent,
                now,
            )
            .await?;
        metrics::set_grid_state(&grid_status.state.to_string());
        for event in &events {
            self.store.append_black_start_event(event).await?;
        }

        let inputs = self.site_inputs(now);
        let decision = self
            .decision_engine
            .decide(&snap, &self.cache, &grid_status, &safety, inputs, now);

        if decision.action != Action::Idle {
            if let Err(e) = self.fieldbus.set_power(decision.signed_power_kw()).await {
                error!(error = %e, "fieldbus set_power failed");
                metrics::record_fieldbus_error("set_power");
            }
        }

        self.store.append_decision(now, &decision).await?;
        self.publish_or_enqueue_decision(now, &decision).await?;

        let sync_mgr = SyncManager::new(&self.store, &self.messaging);
        if let Err(e) = sync_mgr.sync(&snap).await {
            warn!(error = %e, "sync manager pass failed");
        }

        self.messaging.publish_heartbeat(&grid_status.state.to_string()).await.ok();
        self.watchdog.heartbeat();

        Ok(())
    }

    /// Derives the economic layers' site inputs from the cached
    /// cloud-pushed forecasts, keyed by local hour. No dedicated site
    /// meter register exists in the fieldbus map, so facility demand is
    /// taken to be the same forecast load the solar layer consumes.
    fn site_inputs(&self, now: chrono::DateTime<Utc>) -> SiteInputs {
        let hour = now.hour() as usize;
        let load_kw = self
            .cache
            .load_forecast
            .get(now)
            .get(hour)
            .copied()
            .unwrap_or(0.0);
        let solar_gen_kw = self
            .cache
            .solar_forecast
            .get(now)
            .get(hour)
            .copied()
            .unwrap_or(0.0);
        SiteInputs {
            demand_kw: load_kw,
            solar_gen_kw,
            load_kw,
        }
    }

    async fn publish_or_enqueue_decision(
        &self,
        now: chrono::DateTime<Utc>,
        decision: &crate::domain::ControllerDecision,
    ) -> anyhow::Result<()> {
        let payload = serde_json::to_string(decision)?;
        if self.messaging.is_connected() {
            self.messaging.publish_decision(&payload).await.ok();
        } else {
            self.store
                .enqueue_sync("decisions", &payload, MessageQos::AtLeastOnce as i64, now)
                .await?;
        }
        Ok(())
    }

    async fn run_housekeeping(&self) {
        let policy = RetentionPolicy {
            telemetry_hours: self.config.store.telemetry_retention_hours,
            decisions_days: self.config.store.decisions_retention_days,
            alarms_days: self.config.store.alarms_retention_days,
            sync_queue_days: self.config.store.sync_queue_retention_days,
        };
        if let Err(e) = self.store.retention_sweep(policy).await {
            warn!(error = %e, "retention sweep failed");
        }
        let now = Utc::now();
        if self.cache.prices.is_stale(now) {
            info!("price cache is stale, optimization will use its fallback table");
        }
    }

    async fn shutdown(self) {
        self.messaging.publish_offline_status().await.ok();
        self.store.close().await;
    }
}
