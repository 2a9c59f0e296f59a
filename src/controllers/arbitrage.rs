use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::cache::CacheManager;
use crate::domain::{Action, ControllerDecision, DecisionLayer, TelemetrySnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageConfig {
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    pub min_soc_for_sell: f64,
    pub max_soc_for_buy: f64,
    pub max_charge_kw: f64,
    pub max_discharge_kw: f64,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            buy_threshold: 0.45,
            sell_threshold: 0.85,
            min_soc_for_sell: 30.0,
            max_soc_for_buy: 90.0,
            max_charge_kw: 50.0,
            max_discharge_kw: 50.0,
        }
    }
}

/// Price-driven charge/discharge layer (L4 economic).
pub struct ArbitrageController {
    config: ArbitrageConfig,
}

impl ArbitrageController {
    pub fn new(config: ArbitrageConfig) -> Self {
        Self { config }
    }

    pub fn decide(
        &self,
        snap: &TelemetrySnapshot,
        cache: &CacheManager,
        now: chrono::DateTime<chrono::Utc>,
    ) -> ControllerDecision {
        let hour = now.hour() as usize;
        let price = cache.price_for_hour(hour, now);
        let stale = cache.prices.is_stale(now);
        let staleness_note = if stale { " (using stale/fallback price)" } else { "" };

        if price < self.config.buy_threshold && snap.soc_percent < self.config.max_soc_for_buy {
            let power = self.config.max_charge_kw
                * (1.0 - price / self.config.buy_threshold).max(0.5);
            return ControllerDecision::charge(
                DecisionLayer::Economic,
                power,
                format!("arbitrage: price {price:.3} below buy threshold{staleness_note}"),
            );
        }

        if price > self.config.sell_threshold && snap.soc_percent > self.config.min_soc_for_sell {
            let power = self.config.max_discharge_kw
                * (0.5 + (price - self.config.sell_threshold) / self.config.sell_threshold).min(1.0);
            return ControllerDecision::discharge(
                DecisionLayer::Economic,
                power,
                format!("arbitrage: price {price:.3} above sell threshold{staleness_note}"),
            );
        }

        ControllerDecision::idle(
            DecisionLayer::Economic,
            format!("arbitrage: price {price:.3} within band{staleness_note}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::nominal_snapshot;
    use chrono::Utc;

    fn cache_with_price(price: f64) -> CacheManager {
        let mut cache = CacheManager::new();
        let table = [price; 24];
        cache.update_prices(table, Utc::now());
        cache
    }

    #[test]
    fn cheap_price_triggers_charge() {
        let controller = ArbitrageController::new(ArbitrageConfig::default());
        let cache = cache_with_price(0.20);
        let decision = controller.decide(&nominal_snapshot(), &cache, Utc::now());
        assert_eq!(decision.action, Action::Charge);
    }

    #[test]
    fn expensive_price_triggers_discharge_above_min_soc() {
        let controller = ArbitrageController::new(ArbitrageConfig::default());
        let cache = cache_with_price(1.0);
        let mut snap = nominal_snapshot();
        snap.soc_percent = 60.0;
        let decision = controller.decide(&snap, &cache, Utc::now());
        assert_eq!(decision.action, Action::Discharge);
    }

    #[test]
    fn expensive_price_does_not_discharge_below_min_soc() {
        let controller = ArbitrageController::new(ArbitrageConfig::default());
        let cache = cache_with_price(1.0);
        let mut snap = nominal_snapshot();
        snap.soc_percent = 25.0;
        let decision = controller.decide(&snap, &cache, Utc::now());
        assert_eq!(decision.action, Action::Idle);
    }

    #[test]
    fn mid_band_price_is_idle() {
        let controller = ArbitrageController::new(ArbitrageConfig::default());
        let cache = cache_with_price(0.60);
        let decision = controller.decide(&nominal_snapshot(), &cache, Utc::now());
        assert_eq!(decision.action, Action::Idle);
    }
}
