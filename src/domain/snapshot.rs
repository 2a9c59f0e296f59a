use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One field-reading taken from the fieldbus transport. Immutable once
/// constructed; the control loop builds exactly one per successful cycle
/// and every downstream component (safety, controllers, black-start) reads
/// it by shared reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub timestamp: DateTime<Utc>,
    pub soc_percent: f64,
    pub soh_percent: f64,
    pub pack_voltage_v: f64,
    pub pack_current_a: f64,
    pub active_power_kw: f64,
    pub cell_temp_min_c: f64,
    pub cell_temp_max_c: f64,
    pub cell_temp_avg_c: f64,
    pub grid_frequency_hz: f64,
    pub grid_voltage_v: f64,
    pub cell_voltage_min_v: f64,
    pub cell_voltage_max_v: f64,
    pub max_charge_current_a: f64,
    pub max_discharge_current_a: f64,
}

impl TelemetrySnapshot {
    /// Spread between the highest and lowest cell voltage, in millivolts.
    pub fn cell_delta_mv(&self) -> f64 {
        (self.cell_voltage_max_v - self.cell_voltage_min_v) * 1000.0
    }
}

#[cfg(test)]
pub fn nominal_snapshot() -> TelemetrySnapshot {
    TelemetrySnapshot {
        timestamp: Utc::now(),
        soc_percent: 50.0,
        soh_percent: 98.0,
        pack_voltage_v: 400.0,
        pack_current_a: 10.0,
        active_power_kw: 4.0,
        cell_temp_min_c: 20.0,
        cell_temp_max_c: 30.0,
        cell_temp_avg_c: 25.0,
        grid_frequency_hz: 60.0,
        grid_voltage_v: 220.0,
        cell_voltage_min_v: 3.20,
        cell_voltage_max_v: 3.22,
        max_charge_current_a: 200.0,
        max_discharge_current_a: 200.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_delta_mv_matches_voltage_spread() {
        let mut snap = nominal_snapshot();
        snap.cell_voltage_min_v = 3.20;
        snap.cell_voltage_max_v = 3.25;
        assert!((snap.cell_delta_mv() - 50.0).abs() < 1e-9);
    }
}
