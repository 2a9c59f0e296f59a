use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use validator::Validate;

use crate::controllers::{ArbitrageConfig, PeakShavingConfig, SolarConfig};
use crate::messaging::MessagingConfig;

/// Top-level application configuration. Loaded once at startup by
/// [`AppConfig::load`] and never mutated afterward: a cloud `config`
/// push updates the cache manager's `optimization_config` entry, not
/// this record, and nothing here can touch the compile-time safety
/// limits.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub site: SiteConfig,

    #[validate(nested)]
    pub battery: BatteryConfig,

    #[validate(nested)]
    pub fieldbus: FieldbusConfig,

    pub messaging: MessagingConfig,

    #[validate(nested)]
    pub control: ControlConfig,

    #[validate(nested)]
    pub store: StoreConfig,

    pub arbitrage: ArbitrageConfig,
    pub peak_shaving: PeakShavingConfig,
    pub solar: SolarConfig,
}

/// Identifies the site this controller instance is deployed at. Used
/// to pick a `config/<id>.toml` override and to tag every published
/// message and durable record.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SiteConfig {
    #[validate(length(min = 1))]
    pub id: String,

    pub name: String,
}

/// Battery nameplate data. Distinct from the compile-time safety
/// limits in `safety::limits`: those are cell/pack electrochemical
/// bounds, this is the asset the bounds apply to.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct BatteryConfig {
    pub chemistry: String,

    #[validate(range(min = 0.1, max = 10000.0))]
    pub capacity_kwh: f64,

    #[validate(range(min = 1.0, max = 2000.0))]
    pub nominal_voltage_v: f64,

    #[validate(range(min = 1, max = 400))]
    pub cell_count: u32,

    #[validate(range(min = 0.1, max = 2000.0))]
    pub max_charge_power_kw: f64,

    #[validate(range(min = 0.1, max = 2000.0))]
    pub max_discharge_power_kw: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            chemistry: "LiFePO4".to_string(),
            capacity_kwh: 100.0,
            nominal_voltage_v: 48.0,
            cell_count: 16,
            max_charge_power_kw: 50.0,
            max_discharge_power_kw: 50.0,
        }
    }
}

/// Fieldbus transport parameters. `mode` selects between a TCP Modbus
/// gateway and a serial/RTU link; only the fields the selected mode
/// needs are required at deploy time.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct FieldbusConfig {
    /// "tcp" or "serial".
    pub mode: String,

    pub host: Option<String>,

    #[validate(range(min = 1, max = 65535))]
    #[serde(default = "default_modbus_port")]
    pub port: u16,

    pub serial_port: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[validate(range(min = 1, max = 247))]
    pub unit_id: u8,

    #[validate(range(min = 100, max = 30000))]
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[validate(range(min = 0, max = 10))]
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default)]
    pub register_map_path: Option<PathBuf>,
}

impl FieldbusConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let host = self.host.as_deref().unwrap_or("127.0.0.1");
        format!("{host}:{}", self.port)
            .parse()
            .context("failed to parse fieldbus socket address")
    }
}

/// Control loop cadence and timeouts.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ControlConfig {
    #[validate(range(min = 1, max = 3600))]
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,

    #[validate(range(min = 1, max = 3600))]
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    #[validate(range(min = 1, max = 1440))]
    #[serde(default = "default_cloud_timeout")]
    pub cloud_setpoint_timeout_minutes: i64,

    #[validate(range(min = 1, max = 600))]
    #[serde(default = "default_watchdog_timeout")]
    pub watchdog_timeout_secs: u64,
}

/// Durable local store (SQLite) path and retention windows.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct StoreConfig {
    #[validate(length(min = 1))]
    pub sqlite_path: String,

    #[validate(range(min = 1))]
    #[serde(default = "default_telemetry_retention")]
    pub telemetry_retention_hours: i64,

    #[validate(range(min = 1))]
    #[serde(default = "default_decisions_retention")]
    pub decisions_retention_days: i64,

    #[validate(range(min = 1))]
    #[serde(default = "default_alarms_retention")]
    pub alarms_retention_days: i64,

    #[validate(range(min = 1))]
    #[serde(default = "default_sync_queue_retention")]
    pub sync_queue_retention_days: i64,

    #[validate(range(min = 1))]
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_hours: i64,
}

fn default_modbus_port() -> u16 {
    502
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_retry_count() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_sample_interval() -> u64 {
    5
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_cloud_timeout() -> i64 {
    15
}
fn default_watchdog_timeout() -> u64 {
    30
}
fn default_telemetry_retention() -> i64 {
    72
}
fn default_decisions_retention() -> i64 {
    30
}
fn default_alarms_retention() -> i64 {
    30
}
fn default_sync_queue_retention() -> i64 {
    7
}
fn default_cleanup_interval() -> i64 {
    1
}

impl AppConfig {
    /// Load configuration from TOML files and environment variables.
    ///
    /// Layering order (later overrides earlier):
    /// 1. `config/default.toml`
    /// 2. `config/<site>.toml`, if `EDGE_SITE_ID` names one
    /// 3. Environment variables with an `EDGE_` prefix
    ///    (`EDGE_BATTERY__CAPACITY_KWH` -> `battery.capacity_kwh`)
    pub fn load() -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file("config/default.toml"));

        if let Ok(site) = std::env::var("EDGE_SITE_ID") {
            figment = figment.merge(Toml::file(format!("config/{site}.toml")));
        }

        figment = figment.merge(Env::prefixed("EDGE_").split("__"));

        let config: AppConfig = figment.extract().context("failed to parse configuration")?;
        config.validate().context("configuration validation failed")?;
        Ok(config)
    }

    /// Validate an already-constructed configuration, e.g. one built
    /// directly by a test rather than loaded from disk.
    pub fn validate_config(self) -> Result<Self> {
        self.validate().context("configuration validation failed")?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fieldbus() -> FieldbusConfig {
        FieldbusConfig {
            mode: "tcp".to_string(),
            host: Some("127.0.0.1".to_string()),
            port: default_modbus_port(),
            serial_port: None,
            baud_rate: default_baud_rate(),
            unit_id: 1,
            timeout_ms: default_timeout_ms(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            register_map_path: None,
        }
    }

    #[test]
    fn fieldbus_socket_addr_parses_with_defaults() {
        assert!(sample_fieldbus().socket_addr().is_ok());
    }

    #[test]
    fn fieldbus_socket_addr_falls_back_to_loopback() {
        let cfg = FieldbusConfig {
            host: None,
            ..sample_fieldbus()
        };
        assert_eq!(cfg.socket_addr().unwrap().ip().to_string(), "127.0.0.1");
    }

    #[test]
    fn battery_config_default_is_valid() {
        assert!(BatteryConfig::default().validate().is_ok());
    }

    #[test]
    fn site_config_rejects_empty_id() {
        let site = SiteConfig {
            id: String::new(),
            name: "Test Site".to_string(),
        };
        assert!(site.validate().is_err());
    }
}
