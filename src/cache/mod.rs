use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cloud-supplied value the controller keeps working with after the
/// cloud goes offline. `get()` returns `fallback` once the value is
/// stale *and* a fallback exists; otherwise it returns `value` even if
/// stale, because for most of these entries "old but directionally
/// right" beats "nothing."
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub updated_at: Option<DateTime<Utc>>,
    pub ttl_hours: f64,
    pub fallback: Option<T>,
}

impl<T: Clone> CacheEntry<T> {
    pub fn new(value: T, ttl_hours: f64, fallback: Option<T>) -> Self {
        Self {
            value,
            updated_at: None,
            ttl_hours,
            fallback,
        }
    }

    pub fn age_hours(&self, now: DateTime<Utc>) -> Option<f64> {
        self.updated_at
            .map(|u| (now - u).num_seconds() as f64 / 3600.0)
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        if self.ttl_hours.is_infinite() {
            return self.updated_at.is_none() && self.fallback.is_some();
        }
        match self.age_hours(now) {
            Some(age) => age > self.ttl_hours,
            None => true,
        }
    }

    pub fn get(&self, now: DateTime<Utc>) -> T {
        if self.is_stale(now) {
            if let Some(fallback) = &self.fallback {
                return fallback.clone();
            }
        }
        self.value.clone()
    }

    pub fn update(&mut self, value: T, now: DateTime<Utc>) {
        self.value = value;
        self.updated_at = Some(now);
    }
}

/// Hourly price table, index 0..24 keyed by local hour.
pub type PriceTable = [f64; 24];

/// Built-in fallback price table used when no cloud price data has ever
/// arrived; flat and conservative (never the cheapest nor the most
/// expensive hour of a real tariff), so arbitrage stays inert rather
/// than guessing.
pub const DEFAULT_PRICE_TABLE: PriceTable = [0.50; 24];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OptimizationConfig {
    pub arbitrage_enabled: bool,
    pub peak_shaving_enabled: bool,
    pub solar_self_consumption_enabled: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CloudSetpoint {
    pub power_kw: f64,
    pub issued_at: DateTime<Utc>,
}

/// Holds the five TTL-tagged entries the decision layers consult when
/// the cloud is unreachable.
pub struct CacheManager {
    pub prices: CacheEntry<PriceTable>,
    pub load_forecast: CacheEntry<Vec<f64>>,
    pub solar_forecast: CacheEntry<Vec<f64>>,
    pub optimization_config: CacheEntry<OptimizationConfig>,
    pub cloud_setpoint: CacheEntry<Option<CloudSetpoint>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self {
            prices: CacheEntry::new(DEFAULT_PRICE_TABLE, 48.0, Some(DEFAULT_PRICE_TABLE)),
            load_forecast: CacheEntry::new(Vec::new(), 14.0 * 24.0, Some(Vec::new())),
            solar_forecast: CacheEntry::new(Vec::new(), 24.0, Some(Vec::new())),
            optimization_config: CacheEntry::new(OptimizationConfig::default(), f64::INFINITY, None),
            cloud_setpoint: CacheEntry::new(None, 0.25, None),
        }
    }

    pub fn update_prices(&mut self, prices: PriceTable, now: DateTime<Utc>) {
        self.prices.update(prices, now);
    }

    pub fn update_load_forecast(&mut self, forecast: Vec<f64>, now: DateTime<Utc>) {
        self.load_forecast.update(forecast, now);
    }

    pub fn update_solar_forecast(&mut self, forecast: Vec<f64>, now: DateTime<Utc>) {
        self.solar_forecast.update(forecast, now);
    }

    pub fn update_optimization_config(&mut self, config: OptimizationConfig, now: DateTime<Utc>) {
        self.optimization_config.update(config, now);
    }

    pub fn set_cloud_setpoint(&mut self, setpoint: CloudSetpoint, now: DateTime<Utc>) {
        self.cloud_setpoint.update(Some(setpoint), now);
    }

    /// A cloud setpoint is usable only if present and fresh; a stale one
    /// has no fallback, so `get()` would hand back stale data silently.
    pub fn cloud_setpoint_if_valid(&self, now: DateTime<Utc>) -> Option<CloudSetpoint> {
        if self.cache_entry_is_fresh(now) {
            self.cloud_setpoint.value
        } else {
            None
        }
    }

    fn cache_entry_is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.cloud_setpoint.value.is_some() && !self.cloud_setpoint.is_stale(now)
    }

    pub fn price_for_hour(&self, hour: usize, now: DateTime<Utc>) -> f64 {
        self.prices.get(now)[hour % 24]
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fresh_entry_returns_value_not_fallback() {
        let mut entry = CacheEntry::new(1.0, 1.0, Some(0.0));
        let now = Utc::now();
        entry.update(2.0, now);
        assert_eq!(entry.get(now), 2.0);
    }

    #[test]
    fn stale_entry_with_fallback_returns_fallback() {
        let mut entry = CacheEntry::new(1.0, 1.0, Some(0.0));
        let past = Utc::now() - Duration::hours(2);
        entry.update(2.0, past);
        assert_eq!(entry.get(Utc::now()), 0.0);
    }

    #[test]
    fn stale_entry_without_fallback_returns_value_anyway() {
        let mut entry: CacheEntry<f64> = CacheEntry::new(1.0, 1.0, None);
        let past = Utc::now() - Duration::hours(2);
        entry.update(9.0, past);
        assert_eq!(entry.get(Utc::now()), 9.0);
    }

    #[test]
    fn never_updated_entry_is_stale() {
        let entry: CacheEntry<f64> = CacheEntry::new(1.0, 48.0, Some(0.5));
        assert!(entry.is_stale(Utc::now()));
        assert_eq!(entry.get(Utc::now()), 0.5);
    }

    #[test]
    fn cloud_setpoint_invalid_when_stale() {
        let mut cache = CacheManager::new();
        let past = Utc::now() - Duration::minutes(20);
        cache.set_cloud_setpoint(
            CloudSetpoint {
                power_kw: 10.0,
                issued_at: past,
            },
            past,
        );
        assert!(cache.cloud_setpoint_if_valid(Utc::now()).is_none());
    }

    #[test]
    fn cloud_setpoint_valid_when_fresh() {
        let mut cache = CacheManager::new();
        let now = Utc::now();
        cache.set_cloud_setpoint(
            CloudSetpoint {
                power_kw: 10.0,
                issued_at: now,
            },
            now,
        );
        assert!(cache.cloud_setpoint_if_valid(now).is_some());
    }
}
