use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::domain::{Action, ControllerDecision, DecisionLayer, TelemetrySnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakShavingConfig {
    pub demand_limit_kw: f64,
    pub trigger_percent: f64,
    pub min_soc_percent: f64,
    pub recharge_start_hour: u32,
    pub recharge_end_hour: u32,
    pub max_discharge_kw: f64,
    pub max_charge_kw: f64,
}

impl Default for PeakShavingConfig {
    fn default() -> Self {
        Self {
            demand_limit_kw: 100.0,
            trigger_percent: 80.0,
            min_soc_percent: 20.0,
            recharge_start_hour: 22,
            recharge_end_hour: 6,
            max_discharge_kw: 50.0,
            max_charge_kw: 30.0,
        }
    }
}

impl PeakShavingConfig {
    fn trigger_kw(&self) -> f64 {
        self.demand_limit_kw * self.trigger_percent / 100.0
    }

    fn hysteresis_kw(&self) -> f64 {
        self.trigger_kw() * 0.7
    }

    fn is_recharge_window(&self, hour: u32) -> bool {
        if self.recharge_start_hour > self.recharge_end_hour {
            hour >= self.recharge_start_hour || hour < self.recharge_end_hour
        } else {
            self.recharge_start_hour <= hour && hour < self.recharge_end_hour
        }
    }
}

/// Demand-driven discharge layer (L3 contractual). Tracks whether it is
/// currently shaving via a sticky flag so recovery uses hysteresis
/// rather than the trigger threshold, preventing chatter right at the
/// boundary.
pub struct PeakShavingController {
    config: PeakShavingConfig,
    shaving: bool,
}

impl PeakShavingController {
    pub fn new(config: PeakShavingConfig) -> Self {
        Self {
            config,
            shaving: false,
        }
    }

    pub fn update_config(&mut self, config: PeakShavingConfig) {
        self.config = config;
    }

    pub fn decide(
        &mut self,
        snap: &TelemetrySnapshot,
        demand_kw: f64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> ControllerDecision {
        let trigger = self.config.trigger_kw();
        let hysteresis = self.config.hysteresis_kw();

        if demand_kw > trigger && snap.soc_percent > self.config.min_soc_percent {
            self.shaving = true;
            let power = (demand_kw - trigger).min(self.config.max_discharge_kw);
            return ControllerDecision::discharge(
                DecisionLayer::Contractual,
                power,
                format!("peak shaving: demand {demand_kw:.1}kW above trigger {trigger:.1}kW"),
            );
        }

        if demand_kw > trigger {
            self.shaving = false;
            return ControllerDecision::idle(
                DecisionLayer::Contractual,
                "peak shaving: demand above trigger but soc too low to discharge",
            );
        }

        if self.shaving && demand_kw < hysteresis {
            self.shaving = false;
            return ControllerDecision::idle(
                DecisionLayer::Contractual,
                "peak shaving: demand fell below hysteresis band, clearing",
            );
        }

        if self.shaving && demand_kw >= hysteresis && demand_kw <= trigger {
            let power = (0.3 * self.config.max_discharge_kw).min(self.config.max_discharge_kw);
            return ControllerDecision::discharge(
                DecisionLayer::Contractual,
                power,
                "peak shaving: holding partial discharge in hysteresis band",
            );
        }

        if !self.shaving
            && demand_kw <= trigger
            && self.config.is_recharge_window(now.hour())
            && snap.soc_percent < 80.0
        {
            return ControllerDecision::charge(
                DecisionLayer::Contractual,
                self.config.max_charge_kw,
                "peak shaving: recharge window",
            );
        }

        ControllerDecision::idle(DecisionLayer::Contractual, "peak shaving: no action needed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::nominal_snapshot;
    use chrono::{TimeZone, Utc};

    fn at_hour(hour: u32) -> chrono::DateTime<chrono::Utc> {
        Utc.with_ymd_and_hms(2026, 7, 26, hour, 0, 0).unwrap()
    }

    #[test]
    fn demand_above_trigger_discharges() {
        let mut controller = PeakShavingController::new(PeakShavingConfig::default());
        let snap = nominal_snapshot();
        let decision = controller.decide(&snap, 95.0, at_hour(14));
        assert_eq!(decision.action, Action::Discharge);
        assert!((decision.power_kw - 15.0).abs() < 1e-9);
    }

    #[test]
    fn demand_above_trigger_but_low_soc_idles() {
        let mut controller = PeakShavingController::new(PeakShavingConfig::default());
        let mut snap = nominal_snapshot();
        snap.soc_percent = 15.0;
        let decision = controller.decide(&snap, 95.0, at_hour(14));
        assert_eq!(decision.action, Action::Idle);
    }

    #[test]
    fn hysteresis_holds_partial_discharge() {
        let mut controller = PeakShavingController::new(PeakShavingConfig::default());
        let snap = nominal_snapshot();
        controller.decide(&snap, 95.0, at_hour(14));
        let decision = controller.decide(&snap, 75.0, at_hour(14));
        assert_eq!(decision.action, Action::Discharge);
    }

    #[test]
    fn dropping_below_hysteresis_clears_flag() {
        let mut controller = PeakShavingController::new(PeakShavingConfig::default());
        let snap = nominal_snapshot();
        controller.decide(&snap, 95.0, at_hour(14));
        let decision = controller.decide(&snap, 50.0, at_hour(14));
        assert_eq!(decision.action, Action::Idle);
    }

    #[test]
    fn recharges_in_window_when_not_shaving() {
        let mut controller = PeakShavingController::new(PeakShavingConfig::default());
        let mut snap = nominal_snapshot();
        snap.soc_percent = 50.0;
        let decision = controller.decide(&snap, 30.0, at_hour(23));
        assert_eq!(decision.action, Action::Charge);
    }

    #[test]
    fn recharge_window_crosses_midnight() {
        let config = PeakShavingConfig::default();
        assert!(config.is_recharge_window(23));
        assert!(config.is_recharge_window(3));
        assert!(!config.is_recharge_window(12));
    }
}
