use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

// ============================================================================
// Time Helper Types
// ============================================================================

/// Wraps chrono::Duration with convenience constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(pub chrono::Duration);

impl Duration {
    pub fn seconds(secs: i64) -> Self {
        Self(chrono::Duration::seconds(secs))
    }

    pub fn minutes(mins: i64) -> Self {
        Self(chrono::Duration::minutes(mins))
    }

    pub fn hours(hours: i64) -> Self {
        Self(chrono::Duration::hours(hours))
    }

    pub fn days(days: i64) -> Self {
        Self(chrono::Duration::days(days))
    }

    pub fn as_seconds(&self) -> i64 {
        self.0.num_seconds()
    }

    pub fn as_hours_f64(&self) -> f64 {
        self.0.num_seconds() as f64 / 3600.0
    }

    pub fn inner(&self) -> chrono::Duration {
        self.0
    }
}

impl From<chrono::Duration> for Duration {
    fn from(d: chrono::Duration) -> Self {
        Self(d)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0.num_hours();
        let minutes = (self.as_seconds() % 3600) / 60;
        write!(f, "{}h{}m", hours, minutes)
    }
}

/// Wraps DateTime<FixedOffset>; every timestamp the controller touches
/// (fieldbus reads, durable rows, cache entries) goes through this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<FixedOffset>);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().fixed_offset())
    }

    pub fn from_unix(secs: i64) -> Option<Self> {
        chrono::DateTime::from_timestamp(secs, 0).map(|dt| Self(dt.fixed_offset()))
    }

    pub fn as_unix(&self) -> i64 {
        self.0.timestamp()
    }

    pub fn add(&self, duration: Duration) -> Self {
        Self(self.0 + duration.0)
    }

    pub fn duration_since(&self, other: &Timestamp) -> Duration {
        Duration(self.0 - other.0)
    }

    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    pub fn inner(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Self(dt)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S %Z"))
    }
}

// ============================================================================
// Physical Unit Newtypes
// ============================================================================

/// Power in Watts (W).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Power(pub f64);

impl Power {
    pub fn watts(w: f64) -> Self {
        Self(w)
    }

    pub fn kilowatts(kw: f64) -> Self {
        Self(kw * 1000.0)
    }

    pub fn as_watts(&self) -> f64 {
        self.0
    }

    pub fn as_kilowatts(&self) -> f64 {
        self.0 / 1000.0
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.abs() >= 1000.0 {
            write!(f, "{:.2} kW", self.as_kilowatts())
        } else {
            write!(f, "{:.1} W", self.0)
        }
    }
}

impl Add for Power {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Power {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Energy in Watt-hours (Wh).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Energy(pub f64);

impl Energy {
    pub fn watt_hours(wh: f64) -> Self {
        Self(wh)
    }

    pub fn kilowatt_hours(kwh: f64) -> Self {
        Self(kwh * 1000.0)
    }

    pub fn as_watt_hours(&self) -> f64 {
        self.0
    }

    pub fn as_kilowatt_hours(&self) -> f64 {
        self.0 / 1000.0
    }
}

impl fmt::Display for Energy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.abs() >= 1000.0 {
            write!(f, "{:.2} kWh", self.as_kilowatt_hours())
        } else {
            write!(f, "{:.1} Wh", self.0)
        }
    }
}

impl Add for Energy {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Energy {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Voltage in Volts (V).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Voltage(pub f64);

impl Voltage {
    pub fn volts(v: f64) -> Self {
        Self(v)
    }

    pub fn as_volts(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Voltage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} V", self.0)
    }
}

/// Current in Amperes (A).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Current(pub f64);

impl Current {
    pub fn amperes(a: f64) -> Self {
        Self(a)
    }

    pub fn as_amperes(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Current {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} A", self.0)
    }
}

/// Temperature in Celsius (°C).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Temperature(pub f64);

impl Temperature {
    pub fn celsius(c: f64) -> Self {
        Self(c)
    }

    pub fn fahrenheit(f: f64) -> Self {
        Self((f - 32.0) * 5.0 / 9.0)
    }

    pub fn kelvin(k: f64) -> Self {
        Self(k - 273.15)
    }

    pub fn as_celsius(&self) -> f64 {
        self.0
    }

    pub fn as_fahrenheit(&self) -> f64 {
        self.0 * 9.0 / 5.0 + 32.0
    }

    pub fn as_kelvin(&self) -> f64 {
        self.0 + 273.15
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.0)
    }
}

/// Percentage, always clamped to [0, 100].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Percentage(pub f64);

impl Percentage {
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 100.0))
    }

    pub fn from_ratio(ratio: f64) -> Self {
        Self((ratio * 100.0).clamp(0.0, 100.0))
    }

    pub fn as_percent(&self) -> f64 {
        self.0
    }

    pub fn as_ratio(&self) -> f64 {
        self.0 / 100.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

/// Energy price in the site's local currency per kilowatt-hour.
/// Deliberately currency-agnostic: the edge controller only ever compares
/// this against site-configured thresholds, never converts or displays it
/// in a specific denomination.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Price(pub f64);

impl Price {
    pub fn per_kwh(price: f64) -> Self {
        Self(price)
    }

    pub fn as_per_kwh(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}/kWh", self.0)
    }
}

impl Mul<Energy> for Price {
    type Output = f64;
    fn mul(self, energy: Energy) -> Self::Output {
        self.0 * energy.as_kilowatt_hours()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_conversions() {
        let power = Power::kilowatts(5.0);
        assert_eq!(power.as_watts(), 5000.0);
        assert_eq!(power.as_kilowatts(), 5.0);

        let power2 = Power::watts(2500.0);
        assert_eq!(power2.as_kilowatts(), 2.5);
    }

    #[test]
    fn test_power_arithmetic() {
        let p1 = Power::kilowatts(3.0);
        let p2 = Power::kilowatts(2.0);

        assert_eq!((p1 + p2).as_kilowatts(), 5.0);
        assert_eq!((p1 - p2).as_kilowatts(), 1.0);
    }

    #[test]
    fn test_power_display() {
        assert_eq!(format!("{}", Power::watts(500.0)), "500.0 W");
        assert_eq!(format!("{}", Power::kilowatts(5.5)), "5.50 kW");
    }

    #[test]
    fn test_energy_conversions() {
        let energy = Energy::kilowatt_hours(10.0);
        assert_eq!(energy.as_watt_hours(), 10000.0);
        assert_eq!(Energy::watt_hours(5000.0).as_kilowatt_hours(), 5.0);
    }

    #[test]
    fn test_temperature_conversions() {
        let temp = Temperature::celsius(25.0);
        assert!((temp.as_fahrenheit() - 77.0).abs() < 0.1);
        assert!((temp.as_kelvin() - 298.15).abs() < 0.1);
        assert!((Temperature::fahrenheit(77.0).as_celsius() - 25.0).abs() < 0.1);
    }

    #[test]
    fn test_percentage_clamping() {
        assert_eq!(Percentage::new(150.0).as_percent(), 100.0);
        assert_eq!(Percentage::new(-10.0).as_percent(), 0.0);
        assert_eq!(Percentage::from_ratio(0.5).as_percent(), 50.0);
    }

    #[test]
    fn test_price_energy_multiplication() {
        let price = Price::per_kwh(2.0);
        let energy = Energy::kilowatt_hours(10.0);
        assert_eq!(price * energy, 20.0);
    }

    #[test]
    fn test_serialization_round_trip() {
        let power = Power::kilowatts(5.0);
        let json = serde_json::to_string(&power).unwrap();
        let deserialized: Power = serde_json::from_str(&json).unwrap();
        assert_eq!(power, deserialized);
    }
}
