use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the controller's layers produced the final decision for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionLayer {
    Safety,
    GridCode,
    Contractual,
    Economic,
    Cloud,
}

impl fmt::Display for DecisionLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Safety => "SAFETY",
            Self::GridCode => "GRID_CODE",
            Self::Contractual => "CONTRACTUAL",
            Self::Economic => "ECONOMIC",
            Self::Cloud => "CLOUD",
        };
        write!(f, "{s}")
    }
}

/// What a controller wants the fieldbus to do this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Charge,
    Discharge,
    Idle,
}

/// A single cycle's final arbitrated decision. `power_kw` is always a
/// non-negative magnitude; `action` carries the sign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerDecision {
    pub action: Action,
    pub power_kw: f64,
    pub reason: String,
    pub layer: DecisionLayer,
    pub confidence: f64,
}

impl ControllerDecision {
    pub fn idle(layer: DecisionLayer, reason: impl Into<String>) -> Self {
        Self {
            action: Action::Idle,
            power_kw: 0.0,
            reason: reason.into(),
            layer,
            confidence: 1.0,
        }
    }

    pub fn charge(layer: DecisionLayer, power_kw: f64, reason: impl Into<String>) -> Self {
        Self {
            action: Action::Charge,
            power_kw: power_kw.max(0.0),
            reason: reason.into(),
            layer,
            confidence: 1.0,
        }
    }

    pub fn discharge(layer: DecisionLayer, power_kw: f64, reason: impl Into<String>) -> Self {
        Self {
            action: Action::Discharge,
            power_kw: power_kw.max(0.0),
            reason: reason.into(),
            layer,
            confidence: 1.0,
        }
    }

    /// Signed setpoint suitable for a fieldbus write: positive charges,
    /// negative discharges, zero for idle.
    pub fn signed_power_kw(&self) -> f64 {
        match self.action {
            Action::Charge => self.power_kw,
            Action::Discharge => -self.power_kw,
            Action::Idle => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_power_reflects_action() {
        assert_eq!(
            ControllerDecision::charge(DecisionLayer::Economic, 5.0, "x").signed_power_kw(),
            5.0
        );
        assert_eq!(
            ControllerDecision::discharge(DecisionLayer::Economic, 5.0, "x").signed_power_kw(),
            -5.0
        );
        assert_eq!(
            ControllerDecision::idle(DecisionLayer::Safety, "x").signed_power_kw(),
            0.0
        );
    }
}
