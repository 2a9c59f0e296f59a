use serde::{Deserialize, Serialize};

use crate::domain::{Action, ControllerDecision, DecisionLayer, TelemetrySnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolarConfig {
    pub min_solar_excess_kw: f64,
    pub target_soc: f64,
    pub night_discharge: bool,
    pub max_charge_kw: f64,
    pub max_discharge_kw: f64,
}

impl Default for SolarConfig {
    fn default() -> Self {
        Self {
            min_solar_excess_kw: 1.0,
            target_soc: 80.0,
            night_discharge: true,
            max_charge_kw: 50.0,
            max_discharge_kw: 50.0,
        }
    }
}

/// Solar self-consumption layer (L4 economic, consulted after
/// arbitrage). Charges off excess generation; optionally serves load
/// from the battery overnight rather than importing from the grid.
pub struct SolarSelfConsumptionController {
    config: SolarConfig,
}

impl SolarSelfConsumptionController {
    pub fn new(config: SolarConfig) -> Self {
        Self { config }
    }

    pub fn decide(
        &self,
        snap: &TelemetrySnapshot,
        solar_gen_kw: f64,
        load_kw: f64,
    ) -> ControllerDecision {
        let excess = solar_gen_kw - load_kw;

        if excess >= self.config.min_solar_excess_kw && snap.soc_percent < self.config.target_soc {
            let power = excess.min(self.config.max_charge_kw);
            return ControllerDecision::charge(
                DecisionLayer::Economic,
                power,
                format!("solar self-consumption: {excess:.1}kW excess generation"),
            );
        }

        if self.config.night_discharge && solar_gen_kw < 0.5 && snap.soc_percent > 20.0 {
            let power = load_kw.min(self.config.max_discharge_kw);
            if power > 0.5 {
                return ControllerDecision::discharge(
                    DecisionLayer::Economic,
                    power,
                    "solar self-consumption: serving load from battery overnight",
                );
            }
        }

        ControllerDecision::idle(DecisionLayer::Economic, "solar self-consumption: no action needed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::nominal_snapshot;

    #[test]
    fn excess_solar_charges_below_target() {
        let controller = SolarSelfConsumptionController::new(SolarConfig::default());
        let mut snap = nominal_snapshot();
        snap.soc_percent = 50.0;
        let decision = controller.decide(&snap, 10.0, 4.0);
        assert_eq!(decision.action, Action::Charge);
        assert!((decision.power_kw - 6.0).abs() < 1e-9);
    }

    #[test]
    fn no_excess_above_target_soc_idles() {
        let controller = SolarSelfConsumptionController::new(SolarConfig::default());
        let mut snap = nominal_snapshot();
        snap.soc_percent = 90.0;
        let decision = controller.decide(&snap, 10.0, 4.0);
        assert_eq!(decision.action, Action::Idle);
    }

    #[test]
    fn night_discharge_serves_load() {
        let controller = SolarSelfConsumptionController::new(SolarConfig::default());
        let mut snap = nominal_snapshot();
        snap.soc_percent = 60.0;
        let decision = controller.decide(&snap, 0.0, 5.0);
        assert_eq!(decision.action, Action::Discharge);
    }

    #[test]
    fn night_discharge_disabled_idles() {
        let mut config = SolarConfig::default();
        config.night_discharge = false;
        let controller = SolarSelfConsumptionController::new(config);
        let mut snap = nominal_snapshot();
        snap.soc_percent = 60.0;
        let decision = controller.decide(&snap, 0.0, 5.0);
        assert_eq!(decision.action, Action::Idle);
    }
}
