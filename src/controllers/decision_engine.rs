use chrono::{DateTime, Utc};

use super::arbitrage::ArbitrageController;
use super::black_start::BlackStartStatus;
use super::peak_shaving::PeakShavingController;
use super::solar::SolarSelfConsumptionController;
use crate::cache::CacheManager;
use crate::domain::{Action, ControllerDecision, DecisionLayer, GridState, TelemetrySnapshot};
use crate::safety::{SafetyAction, SafetyResult};

/// Inputs the economic layers need beyond telemetry and cache: the
/// current site demand (for peak shaving) and solar generation (for
/// self-consumption). In a full deployment these come from additional
/// meters; here they are supplied by the caller each cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiteInputs {
    pub demand_kw: f64,
    pub solar_gen_kw: f64,
    pub load_kw: f64,
}

/// Walks the five priority layers (safety, grid-code, contractual,
/// economic, cloud) and produces exactly one decision per cycle.
pub struct DecisionEngine {
    pub arbitrage: ArbitrageController,
    pub peak_shaving: PeakShavingController,
    pub solar: SolarSelfConsumptionController,
}

impl DecisionEngine {
    pub fn new(
        arbitrage: ArbitrageController,
        peak_shaving: PeakShavingController,
        solar: SolarSelfConsumptionController,
    ) -> Self {
        Self {
            arbitrage,
            peak_shaving,
            solar,
        }
    }

    pub fn decide(
        &mut self,
        snap: &TelemetrySnapshot,
        cache: &CacheManager,
        grid_status: &BlackStartStatus,
        safety: &SafetyResult,
        inputs: SiteInputs,
        now: DateTime<Utc>,
    ) -> ControllerDecision {
        // L1 SAFETY: optimizer layers are never invoked past this point
        // when safety is not OK.
        if !safety.is_ok() {
            return Self::decision_from_safety(safety);
        }

        // L2 GRID_CODE: while not grid-connected, black-start owns
        // dispatch; the optimization layers stay idle.
        if grid_status.state != GridState::GridConnected {
            return ControllerDecision::idle(
                DecisionLayer::GridCode,
                format!("grid state {} owns dispatch", grid_status.state),
            );
        }

        // L3 CONTRACTUAL: peak shaving.
        let shaving = self.peak_shaving.decide(snap, inputs.demand_kw, now);
        if shaving.action != Action::Idle {
            return shaving;
        }

        // L4 ECONOMIC: arbitrage first, then solar self-consumption.
        let arbitrage = self.arbitrage.decide(snap, cache, now);
        if arbitrage.action != Action::Idle {
            return arbitrage;
        }
        let solar = self.solar.decide(snap, inputs.solar_gen_kw, inputs.load_kw);
        if solar.action != Action::Idle {
            return solar;
        }

        // L5 CLOUD: only reached if nothing above fired.
        if let Some(setpoint) = cache.cloud_setpoint_if_valid(now) {
            if setpoint.power_kw > 0.0 {
                return ControllerDecision::charge(
                    DecisionLayer::Cloud,
                    setpoint.power_kw,
                    "cloud setpoint",
                );
            } else if setpoint.power_kw < 0.0 {
                return ControllerDecision::discharge(
                    DecisionLayer::Cloud,
                    -setpoint.power_kw,
                    "cloud setpoint",
                );
            }
        }

        ControllerDecision::idle(DecisionLayer::Economic, "no layer requested action")
    }

    fn decision_from_safety(safety: &SafetyResult) -> ControllerDecision {
        match safety.action {
            SafetyAction::Ok => unreachable!("caller checked safety.is_ok()"),
            SafetyAction::EmergencyStop | SafetyAction::StopAll => {
                ControllerDecision::idle(DecisionLayer::Safety, safety.reason.clone())
            }
            SafetyAction::StopCharge | SafetyAction::StopDischarge => {
                ControllerDecision::idle(DecisionLayer::Safety, safety.reason.clone())
            }
            SafetyAction::ReducePower | SafetyAction::ReduceCurrent => {
                ControllerDecision::idle(DecisionLayer::Safety, safety.reason.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::arbitrage::ArbitrageConfig;
    use crate::controllers::peak_shaving::PeakShavingConfig;
    use crate::controllers::solar::SolarConfig;
    use crate::domain::snapshot::nominal_snapshot;
    use crate::domain::LoadPriority;
    use crate::safety::{SafetyManager, Severity};

    fn engine() -> DecisionEngine {
        DecisionEngine::new(
            ArbitrageController::new(ArbitrageConfig::default()),
            PeakShavingController::new(PeakShavingConfig::default()),
            SolarSelfConsumptionController::new(SolarConfig::default()),
        )
    }

    fn grid_connected() -> BlackStartStatus {
        BlackStartStatus {
            state: GridState::GridConnected,
            active_loads: LoadPriority::ALL.to_vec(),
        }
    }

    #[test]
    fn safety_violation_skips_all_optimizers() {
        let mut snap = nominal_snapshot();
        snap.cell_voltage_max_v = 3.70;
        let safety = SafetyManager::new().check(&snap);
        assert!(!safety.is_ok());

        let decision = engine().decide(
            &snap,
            &CacheManager::new(),
            &grid_connected(),
            &safety,
            SiteInputs::default(),
            Utc::now(),
        );
        assert_eq!(decision.action, Action::Idle);
        assert_eq!(decision.layer, DecisionLayer::Safety);
        assert_eq!(decision.power_kw, 0.0);
    }

    #[test]
    fn nominal_conditions_run_optimization() {
        let snap = nominal_snapshot();
        let safety = SafetyManager::new().check(&snap);
        assert!(safety.is_ok());

        let mut cache = CacheManager::new();
        cache.update_prices([0.20; 24], Utc::now());

        let decision = engine().decide(
            &snap,
            &cache,
            &grid_connected(),
            &safety,
            SiteInputs::default(),
            Utc::now(),
        );
        assert_eq!(decision.layer, DecisionLayer::Economic);
        assert_eq!(decision.action, Action::Charge);
    }

    #[test]
    fn island_mode_suppresses_optimization() {
        let snap = nominal_snapshot();
        let safety = SafetyManager::new().check(&snap);
        let island = BlackStartStatus {
            state: GridState::IslandMode,
            active_loads: LoadPriority::ALL.to_vec(),
        };

        let decision = engine().decide(
            &snap,
            &CacheManager::new(),
            &island,
            &safety,
            SiteInputs::default(),
            Utc::now(),
        );
        assert_eq!(decision.layer, DecisionLayer::GridCode);
        assert_eq!(decision.action, Action::Idle);
    }

    #[test]
    fn peak_shaving_preempts_arbitrage() {
        let snap = nominal_snapshot();
        let safety = SafetyManager::new().check(&snap);
        let mut cache = CacheManager::new();
        cache.update_prices([0.20; 24], Utc::now()); // would want to charge

        let decision = engine().decide(
            &snap,
            &cache,
            &grid_connected(),
            &safety,
            SiteInputs {
                demand_kw: 95.0,
                ..Default::default()
            },
            Utc::now(),
        );
        assert_eq!(decision.layer, DecisionLayer::Contractual);
        assert_eq!(decision.action, Action::Discharge);
    }

    #[test]
    fn severity_is_critical_for_emergency_stop() {
        let mut snap = nominal_snapshot();
        snap.cell_temp_max_c = 60.0;
        let safety = SafetyManager::new().check(&snap);
        assert_eq!(safety.severity, Severity::Critical);
    }
}
