use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::FieldbusTransport;
use crate::domain::snapshot::TelemetrySnapshot;
use crate::error::EdgeResult;

/// Deterministic in-memory fieldbus fixture used by tests and the
/// control loop's own test suite. Records every power/coil write so
/// tests can assert on what the loop tried to do without a real device.
pub struct FakeFieldbus {
    next_snapshot: Mutex<Option<TelemetrySnapshot>>,
    power_writes: Mutex<Vec<f64>>,
    coil_writes: Mutex<HashMap<String, bool>>,
    fail_reads: Mutex<bool>,
}

impl FakeFieldbus {
    pub fn new() -> Self {
        Self {
            next_snapshot: Mutex::new(None),
            power_writes: Mutex::new(Vec::new()),
            coil_writes: Mutex::new(HashMap::new()),
            fail_reads: Mutex::new(false),
        }
    }

    pub fn push_snapshot(&self, snap: TelemetrySnapshot) {
        *self.next_snapshot.lock() = Some(snap);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.lock() = fail;
    }

    pub fn power_writes(&self) -> Vec<f64> {
        self.power_writes.lock().clone()
    }

    pub fn coil(&self, name: &str) -> Option<bool> {
        self.coil_writes.lock().get(name).copied()
    }
}

impl Default for FakeFieldbus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FieldbusTransport for FakeFieldbus {
    async fn read_telemetry(&self) -> EdgeResult<Option<TelemetrySnapshot>> {
        if *self.fail_reads.lock() {
            return Ok(None);
        }
        Ok(self.next_snapshot.lock().take())
    }

    async fn set_power(&self, signed_kw: f64) -> EdgeResult<()> {
        self.power_writes.lock().push(signed_kw);
        Ok(())
    }

    async fn set_coil(&self, name: &str, value: bool) -> EdgeResult<()> {
        self.coil_writes.lock().insert(name.to_string(), value);
        Ok(())
    }

    async fn emergency_stop(&self) -> EdgeResult<()> {
        self.set_coil("emergency_stop", true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::nominal_snapshot;

    #[tokio::test]
    async fn returns_none_when_no_snapshot_queued() {
        let bus = FakeFieldbus::new();
        assert!(bus.read_telemetry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn returns_queued_snapshot_once() {
        let bus = FakeFieldbus::new();
        bus.push_snapshot(nominal_snapshot());
        assert!(bus.read_telemetry().await.unwrap().is_some());
        assert!(bus.read_telemetry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn records_power_writes() {
        let bus = FakeFieldbus::new();
        bus.set_power(5.0).await.unwrap();
        bus.set_power(-3.0).await.unwrap();
        assert_eq!(bus.power_writes(), vec![5.0, -3.0]);
    }
}
