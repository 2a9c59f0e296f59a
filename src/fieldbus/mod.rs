pub mod fake;
#[cfg(feature = "modbus")]
pub mod modbus;
pub mod registers;

use async_trait::async_trait;

use crate::domain::snapshot::TelemetrySnapshot;
use crate::error::EdgeResult;

pub use fake::FakeFieldbus;
pub use registers::{decode_f32, encode_f32, RegisterMap};

/// Capability interface every physical or simulated field transport
/// implements. The rest of the system depends only on this trait, never
/// on a concrete protocol, so adding CAN later means adding an
/// implementation, not touching a caller.
#[async_trait]
pub trait FieldbusTransport: Send + Sync {
    async fn read_telemetry(&self) -> EdgeResult<Option<TelemetrySnapshot>>;
    async fn set_power(&self, signed_kw: f64) -> EdgeResult<()>;
    async fn set_coil(&self, name: &str, value: bool) -> EdgeResult<()>;
    async fn emergency_stop(&self) -> EdgeResult<()>;
}
