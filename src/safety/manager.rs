use serde::{Deserialize, Serialize};
use std::fmt;

use super::limits;
use crate::domain::snapshot::TelemetrySnapshot;

/// What the safety layer demands of the rest of the system this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyAction {
    Ok,
    EmergencyStop,
    StopCharge,
    StopDischarge,
    StopAll,
    ReducePower,
    ReduceCurrent,
}

impl fmt::Display for SafetyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::EmergencyStop => "EMERGENCY_STOP",
            Self::StopCharge => "STOP_CHARGE",
            Self::StopDischarge => "STOP_DISCHARGE",
            Self::StopAll => "STOP_ALL",
            Self::ReducePower => "REDUCE_POWER",
            Self::ReduceCurrent => "REDUCE_CURRENT",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    None,
    Medium,
    High,
    Critical,
}

/// Outcome of evaluating one `TelemetrySnapshot` against the hard limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyResult {
    pub action: SafetyAction,
    pub reason: String,
    pub severity: Severity,
    pub violated_value: Option<f64>,
    pub limit: Option<f64>,
}

impl SafetyResult {
    pub fn is_ok(&self) -> bool {
        self.action == SafetyAction::Ok
    }

    fn ok() -> Self {
        Self {
            action: SafetyAction::Ok,
            reason: "within limits".to_string(),
            severity: Severity::None,
            violated_value: None,
            limit: None,
        }
    }

    fn violation(
        action: SafetyAction,
        severity: Severity,
        reason: impl Into<String>,
        value: f64,
        limit: f64,
    ) -> Self {
        Self {
            action,
            reason: reason.into(),
            severity,
            violated_value: Some(value),
            limit: Some(limit),
        }
    }
}

/// Pure, stateless evaluator of the nine priority-ordered safety rules.
/// Carries no configuration: the limits it checks against are the
/// compile-time constants in [`super::limits`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SafetyManager;

impl SafetyManager {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate the snapshot. Rules are checked in order; the first
    /// triggered rule's action is returned. Optimizer layers must never
    /// be consulted when the result is not `Ok`.
    pub fn check(&self, snap: &TelemetrySnapshot) -> SafetyResult {
        if snap.cell_voltage_max_v > limits::CELL_VOLTAGE_MAX_V {
            return SafetyResult::violation(
                SafetyAction::EmergencyStop,
                Severity::Critical,
                "cell overvoltage",
                snap.cell_voltage_max_v,
                limits::CELL_VOLTAGE_MAX_V,
            );
        }
        if snap.cell_voltage_min_v < limits::CELL_VOLTAGE_MIN_V {
            return SafetyResult::violation(
                SafetyAction::StopDischarge,
                Severity::High,
                "cell undervoltage",
                snap.cell_voltage_min_v,
                limits::CELL_VOLTAGE_MIN_V,
            );
        }
        if snap.cell_temp_max_c > limits::PACK_TEMP_MAX_C {
            return SafetyResult::violation(
                SafetyAction::EmergencyStop,
                Severity::Critical,
                "pack overtemperature",
                snap.cell_temp_max_c,
                limits::PACK_TEMP_MAX_C,
            );
        }
        if snap.cell_temp_min_c < limits::PACK_TEMP_MIN_C {
            return SafetyResult::violation(
                SafetyAction::StopAll,
                Severity::Critical,
                "pack undertemperature",
                snap.cell_temp_min_c,
                limits::PACK_TEMP_MIN_C,
            );
        }
        if snap.soc_percent < limits::SOC_ABSOLUTE_MIN_PCT {
            return SafetyResult::violation(
                SafetyAction::StopDischarge,
                Severity::High,
                "soc at absolute minimum",
                snap.soc_percent,
                limits::SOC_ABSOLUTE_MIN_PCT,
            );
        }
        if snap.soc_percent > limits::SOC_ABSOLUTE_MAX_PCT {
            return SafetyResult::violation(
                SafetyAction::StopCharge,
                Severity::High,
                "soc at absolute maximum",
                snap.soc_percent,
                limits::SOC_ABSOLUTE_MAX_PCT,
            );
        }
        let delta_mv = snap.cell_delta_mv();
        if delta_mv > limits::CELL_DELTA_MAX_MV {
            return SafetyResult::violation(
                SafetyAction::ReducePower,
                Severity::Medium,
                "cell voltage imbalance",
                delta_mv,
                limits::CELL_DELTA_MAX_MV,
            );
        }
        if snap.cell_temp_max_c > limits::PACK_TEMP_WARN_C {
            return SafetyResult::violation(
                SafetyAction::ReducePower,
                Severity::Medium,
                "pack temperature warning",
                snap.cell_temp_max_c,
                limits::PACK_TEMP_WARN_C,
            );
        }
        SafetyResult::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::nominal_snapshot;

    #[test]
    fn nominal_snapshot_is_ok() {
        let result = SafetyManager::new().check(&nominal_snapshot());
        assert!(result.is_ok());
        assert_eq!(result.severity, Severity::None);
    }

    #[test]
    fn cell_overvoltage_is_emergency_stop() {
        let mut snap = nominal_snapshot();
        snap.cell_voltage_max_v = 3.70;
        let result = SafetyManager::new().check(&snap);
        assert_eq!(result.action, SafetyAction::EmergencyStop);
        assert_eq!(result.severity, Severity::Critical);
    }

    #[test]
    fn cell_undervoltage_stops_discharge_only() {
        let mut snap = nominal_snapshot();
        snap.cell_voltage_min_v = 2.4;
        let result = SafetyManager::new().check(&snap);
        assert_eq!(result.action, SafetyAction::StopDischarge);
    }

    #[test]
    fn overtemperature_beats_lower_priority_rules() {
        // Both the soc-low rule and the overtemperature rule would trigger;
        // overtemperature is rule #3, soc is rule #5, so it must win.
        let mut snap = nominal_snapshot();
        snap.cell_temp_max_c = 56.0;
        snap.soc_percent = 3.0;
        let result = SafetyManager::new().check(&snap);
        assert_eq!(result.action, SafetyAction::EmergencyStop);
        assert_eq!(result.reason, "pack overtemperature");
    }

    #[test]
    fn undertemperature_stops_all() {
        let mut snap = nominal_snapshot();
        snap.cell_temp_min_c = -11.0;
        assert_eq!(
            SafetyManager::new().check(&snap).action,
            SafetyAction::StopAll
        );
    }

    #[test]
    fn soc_floor_stops_discharge() {
        let mut snap = nominal_snapshot();
        snap.soc_percent = 4.0;
        assert_eq!(
            SafetyManager::new().check(&snap).action,
            SafetyAction::StopDischarge
        );
    }

    #[test]
    fn soc_ceiling_stops_charge() {
        let mut snap = nominal_snapshot();
        snap.soc_percent = 99.0;
        assert_eq!(
            SafetyManager::new().check(&snap).action,
            SafetyAction::StopCharge
        );
    }

    #[test]
    fn cell_imbalance_reduces_power() {
        let mut snap = nominal_snapshot();
        snap.cell_voltage_min_v = 3.00;
        snap.cell_voltage_max_v = 3.15;
        assert_eq!(
            SafetyManager::new().check(&snap).action,
            SafetyAction::ReducePower
        );
    }

    #[test]
    fn warm_pack_reduces_power() {
        let mut snap = nominal_snapshot();
        snap.cell_temp_max_c = 46.0;
        assert_eq!(
            SafetyManager::new().check(&snap).action,
            SafetyAction::ReducePower
        );
    }

    #[test]
    fn boundary_values_are_not_violations() {
        let mut snap = nominal_snapshot();
        snap.cell_voltage_max_v = limits::CELL_VOLTAGE_MAX_V;
        snap.cell_voltage_min_v = limits::CELL_VOLTAGE_MIN_V;
        snap.cell_temp_max_c = limits::PACK_TEMP_WARN_C;
        snap.cell_temp_min_c = limits::PACK_TEMP_MIN_C;
        snap.soc_percent = limits::SOC_ABSOLUTE_MAX_PCT;
        assert!(SafetyManager::new().check(&snap).is_ok());
    }
}
