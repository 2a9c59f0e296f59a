use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

use crate::domain::{active_priorities_for_soc, GridState, LoadPriority};
use crate::fieldbus::FieldbusTransport;
use crate::safety::limits;

/// A state transition or load-shed event emitted by the FSM, destined
/// for the durable store's alarms table and (if reachable) the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackStartEvent {
    pub kind: String,
    pub detail: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackStartStatus {
    pub state: GridState,
    pub active_loads: Vec<LoadPriority>,
}

/// Six-state grid-failure detection, transfer, island, and reconnect
/// state machine. Advances at most one state per call to `process`.
pub struct BlackStartController {
    state: GridState,
    failure_readings: u32,
    island_start: Option<DateTime<Utc>>,
    sync_start: Option<DateTime<Utc>>,
    active_loads: Vec<LoadPriority>,
}

impl BlackStartController {
    pub fn new() -> Self {
        Self {
            state: GridState::GridConnected,
            failure_readings: 0,
            island_start: None,
            sync_start: None,
            active_loads: LoadPriority::ALL.to_vec(),
        }
    }

    pub fn state(&self) -> GridState {
        self.state
    }

    pub async fn process(
        &mut self,
        fieldbus: &dyn FieldbusTransport,
        frequency_hz: f64,
        grid_voltage_v: f64,
        soc_percent: f64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<(BlackStartStatus, Vec<BlackStartEvent>)> {
        let mut events = Vec::new();
        self.transition(fieldbus, frequency_hz, grid_voltage_v, now, &mut events)
            .await?;
        if self.state == GridState::IslandMode {
            self.apply_load_shedding(soc_percent, now, &mut events);
        }
        Ok((
            BlackStartStatus {
                state: self.state,
                active_loads: self.active_loads.clone(),
            },
            events,
        ))
    }

    async fn transition(
        &mut self,
        fieldbus: &dyn FieldbusTransport,
        frequency_hz: f64,
        grid_voltage_v: f64,
        now: DateTime<Utc>,
        events: &mut Vec<BlackStartEvent>,
    ) -> anyhow::Result<()> {
        match self.state {
            GridState::GridConnected => {
                let failing = frequency_hz < limits::BLACKSTART_FREQ_MIN_HZ
                    || grid_voltage_v < limits::BLACKSTART_VOLTAGE_MIN_V;
                if failing {
                    self.failure_readings += 1;
                } else {
                    self.failure_readings = 0;
                }
                if self.failure_readings >= limits::BLACKSTART_CONFIRM_READINGS {
                    self.state = GridState::GridFailureDetected;
                    warn!(frequency_hz, grid_voltage_v, "grid failure confirmed");
                    events.push(self.event(
                        "grid_failure_detected",
                        json!({ "frequency_hz": frequency_hz, "grid_voltage_v": grid_voltage_v }),
                        now,
                    ));
                }
            }
            GridState::GridFailureDetected => {
                fieldbus.set_coil("grid_contactor", false).await?;
                tokio::time::sleep(StdDuration::from_millis(100)).await;
                fieldbus.set_coil("backup_contactor", true).await?;
                self.state = GridState::Transferring;
                events.push(self.event("transfer_started", json!({}), now));
            }
            GridState::Transferring => {
                self.state = GridState::IslandMode;
                self.island_start = Some(now);
                self.active_loads = LoadPriority::ALL.to_vec();
                info!("island mode started");
                events.push(self.event("island_mode_started", json!({}), now));
            }
            GridState::IslandMode => {
                let recovered = (limits::GRID_FREQ_MIN_HZ..=limits::GRID_FREQ_MAX_HZ)
                    .contains(&frequency_hz)
                    && grid_voltage_v >= limits::BLACKSTART_VOLTAGE_RESTORE_V;
                if recovered {
                    self.state = GridState::Reconnecting;
                    events.push(self.event("grid_recovered", json!({}), now));
                }
            }
            GridState::Reconnecting => {
                self.state = GridState::Synchronizing;
                self.sync_start = Some(now);
            }
            GridState::Synchronizing => {
                let in_sync_band = (limits::SYNC_FREQ_MIN_HZ..=limits::SYNC_FREQ_MAX_HZ)
                    .contains(&frequency_hz)
                    && grid_voltage_v >= limits::BLACKSTART_VOLTAGE_RESTORE_V;
                let elapsed = self
                    .sync_start
                    .map(|start| (now - start).num_milliseconds() as f64 / 1000.0)
                    .unwrap_or(0.0);
                if in_sync_band && elapsed >= limits::SYNC_MIN_DURATION_S {
                    fieldbus.set_coil("backup_contactor", false).await?;
                    tokio::time::sleep(StdDuration::from_millis(200)).await;
                    fieldbus.set_coil("grid_contactor", true).await?;
                    self.state = GridState::GridConnected;
                    self.active_loads = LoadPriority::ALL.to_vec();
                    self.failure_readings = 0;
                    self.island_start = None;
                    self.sync_start = None;
                    info!("grid reconnected");
                    events.push(self.event("grid_reconnected", json!({}), now));
                }
            }
        }
        Ok(())
    }

    fn apply_load_shedding(
        &mut self,
        soc_percent: f64,
        now: DateTime<Utc>,
        events: &mut Vec<BlackStartEvent>,
    ) {
        let target = active_priorities_for_soc(soc_percent);
        let mut shed: Vec<LoadPriority> = self
            .active_loads
            .iter()
            .copied()
            .filter(|p| !target.contains(p))
            .collect();
        shed.sort_by(|a, b| b.cmp(a));
        for priority in shed {
            events.push(self.event(
                "load_shed",
                json!({
                    "priority": priority as i32,
                    "load_type": priority.label(),
                    "soc_percent": soc_percent,
                }),
                now,
            ));
        }
        self.active_loads = target;
    }

    fn event(&self, kind: &str, detail: serde_json::Value, timestamp: DateTime<Utc>) -> BlackStartEvent {
        BlackStartEvent {
            kind: kind.to_string(),
            detail,
            timestamp,
        }
    }
}

impl Default for BlackStartController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fieldbus::FakeFieldbus;
    use chrono::Duration;

    #[tokio::test]
    async fn single_dip_does_not_trip() {
        let bus = FakeFieldbus::new();
        let mut ctrl = BlackStartController::new();
        let now = Utc::now();
        ctrl.process(&bus, 48.0, 170.0, 50.0, now).await.unwrap();
        ctrl.process(&bus, 60.0, 220.0, 50.0, now).await.unwrap();
        assert_eq!(ctrl.state(), GridState::GridConnected);
    }

    #[tokio::test]
    async fn confirmed_failure_walks_through_transfer_to_island() {
        let bus = FakeFieldbus::new();
        let mut ctrl = BlackStartController::new();
        let now = Utc::now();
        ctrl.process(&bus, 48.0, 170.0, 50.0, now).await.unwrap();
        let (status, events) = ctrl.process(&bus, 48.0, 170.0, 50.0, now).await.unwrap();
        assert_eq!(status.state, GridState::GridFailureDetected);
        assert_eq!(events[0].kind, "grid_failure_detected");

        let (status, _) = ctrl.process(&bus, 48.0, 170.0, 50.0, now).await.unwrap();
        assert_eq!(status.state, GridState::Transferring);
        assert_eq!(bus.coil("grid_contactor"), Some(false));
        assert_eq!(bus.coil("backup_contactor"), Some(true));

        let (status, events) = ctrl.process(&bus, 48.0, 170.0, 50.0, now).await.unwrap();
        assert_eq!(status.state, GridState::IslandMode);
        assert_eq!(events[0].kind, "island_mode_started");
    }

    #[tokio::test]
    async fn island_deadband_prevents_chatter() {
        let bus = FakeFieldbus::new();
        let mut ctrl = BlackStartController::new();
        let now = Utc::now();
        for _ in 0..3 {
            ctrl.process(&bus, 48.0, 170.0, 50.0, now).await.unwrap();
        }
        assert_eq!(ctrl.state(), GridState::IslandMode);

        // 200V is above BLACKSTART_VOLTAGE_MIN_V but below the 210V
        // restore threshold; must not leave island mode.
        ctrl.process(&bus, 60.0, 200.0, 50.0, now).await.unwrap();
        assert_eq!(ctrl.state(), GridState::IslandMode);

        ctrl.process(&bus, 60.0, 215.0, 50.0, now).await.unwrap();
        assert_eq!(ctrl.state(), GridState::Reconnecting);
    }

    #[tokio::test]
    async fn synchronizing_requires_minimum_duration() {
        let bus = FakeFieldbus::new();
        let mut ctrl = BlackStartController::new();
        for _ in 0..3 {
            ctrl.process(&bus, 48.0, 170.0, 50.0, Utc::now())
                .await
                .unwrap();
        }
        ctrl.process(&bus, 60.0, 215.0, 50.0, Utc::now())
            .await
            .unwrap(); // -> Reconnecting
        ctrl.process(&bus, 60.0, 215.0, 50.0, Utc::now())
            .await
            .unwrap(); // -> Synchronizing

        let start = Utc::now();
        ctrl.process(&bus, 60.0, 220.0, 50.0, start).await.unwrap();
        assert_eq!(ctrl.state(), GridState::Synchronizing);

        let (status, events) = ctrl
            .process(&bus, 60.0, 220.0, 50.0, start + Duration::seconds(31))
            .await
            .unwrap();
        assert_eq!(status.state, GridState::GridConnected);
        assert_eq!(events[0].kind, "grid_reconnected");
    }

    #[tokio::test]
    async fn island_shedding_drops_lowest_priority_first() {
        let bus = FakeFieldbus::new();
        let mut ctrl = BlackStartController::new();
        let now = Utc::now();
        for _ in 0..3 {
            ctrl.process(&bus, 48.0, 170.0, 45.0, now).await.unwrap();
        }
        assert_eq!(ctrl.state(), GridState::IslandMode);

        let (status, events) = ctrl.process(&bus, 48.0, 170.0, 35.0, now).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "load_shed");
        assert!(!status.active_loads.contains(&LoadPriority::Elevators));

        let (status, _) = ctrl.process(&bus, 48.0, 170.0, 8.0, now).await.unwrap();
        assert_eq!(status.active_loads, vec![LoadPriority::LifeSafety, LoadPriority::Communications]);
    }
}
