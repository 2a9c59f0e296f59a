//! Hardcoded hard safety limits.
//!
//! These are compile-time constants, not configuration. No public function
//! in this crate may rebind them, and no config file, cloud message, or
//! environment variable ever reaches this module. A site that needs
//! different limits ships a different build.

pub const CELL_VOLTAGE_MIN_V: f64 = 2.5;
pub const CELL_VOLTAGE_MAX_V: f64 = 3.65;
pub const CELL_DELTA_MAX_MV: f64 = 100.0;

pub const PACK_TEMP_MIN_C: f64 = -10.0;
pub const PACK_TEMP_MAX_C: f64 = 55.0;
pub const PACK_TEMP_WARN_C: f64 = 45.0;

pub const SOC_ABSOLUTE_MIN_PCT: f64 = 5.0;
pub const SOC_ABSOLUTE_MAX_PCT: f64 = 98.0;

pub const GRID_FREQ_MIN_HZ: f64 = 49.0;
pub const GRID_FREQ_MAX_HZ: f64 = 51.0;
pub const GRID_VOLTAGE_MIN_V: f64 = 180.0;
pub const GRID_VOLTAGE_MAX_V: f64 = 265.0;

pub const BLACKSTART_FREQ_MIN_HZ: f64 = 49.5;
pub const BLACKSTART_VOLTAGE_MIN_V: f64 = 180.0;
pub const BLACKSTART_VOLTAGE_RESTORE_V: f64 = 210.0;
pub const BLACKSTART_CONFIRM_READINGS: u32 = 2;

/// Reconnection is held to a tighter band than the steady-state grid
/// limits above, intentionally: syncing back onto a live grid needs a
/// cleaner signal than merely staying connected to one.
pub const SYNC_FREQ_MIN_HZ: f64 = 59.9;
pub const SYNC_FREQ_MAX_HZ: f64 = 60.1;
pub const SYNC_MIN_DURATION_S: f64 = 30.0;
