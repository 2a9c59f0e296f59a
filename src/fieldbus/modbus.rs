use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_modbus::client::{tcp, Context, Reader, Writer};
use tokio_modbus::slave::Slave;
use tracing::{error, warn};

use super::registers::{decode_f32, encode_f32, RegisterMap};
use super::FieldbusTransport;
use crate::domain::snapshot::TelemetrySnapshot;
use crate::error::{EdgeError, EdgeResult};

/// Retry policy for fieldbus reads/writes: up to `retry_count` attempts,
/// each delayed by `retry_delay_ms * 2^attempt` beyond the first.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_delay_ms: 500,
            timeout_ms: 5000,
        }
    }
}

/// Modbus TCP transport. The connection handle is re-established lazily
/// on the next call after any failure; callers never see a "reconnect"
/// method, they just keep calling `read_telemetry`.
pub struct ModbusTransport {
    addr: SocketAddr,
    unit_id: u8,
    retry: RetryPolicy,
    register_map: RegisterMap,
    ctx: Mutex<Option<Context>>,
}

impl ModbusTransport {
    pub fn new(addr: SocketAddr, unit_id: u8, retry: RetryPolicy, register_map: RegisterMap) -> Self {
        Self {
            addr,
            unit_id,
            retry,
            register_map,
            ctx: Mutex::new(None),
        }
    }

    async fn ensure_connected<'a>(
        &self,
        guard: &mut tokio::sync::MutexGuard<'a, Option<Context>>,
    ) -> EdgeResult<()> {
        if guard.is_some() {
            return Ok(());
        }
        let ctx = tcp::connect_slave(self.addr, Slave(self.unit_id))
            .await
            .map_err(|e| EdgeError::Transport {
                register: "connect".to_string(),
                source: e.into(),
            })?;
        **guard = Some(ctx);
        Ok(())
    }

    async fn read_register_retried(&self, name: &str) -> EdgeResult<[u16; 2]> {
        let def = self
            .register_map
            .get(name)
            .ok_or_else(|| EdgeError::SchemaMismatch(format!("unknown register '{name}'")))?;

        let mut last_err: Option<EdgeError> = None;
        for attempt in 0..=self.retry.retry_count {
            let mut guard = self.ctx.lock().await;
            if let Err(e) = self.ensure_connected(&mut guard).await {
                last_err = Some(e);
                *guard = None;
            } else {
                let read = timeout(
                    StdDuration::from_millis(self.retry.timeout_ms),
                    guard.as_mut().unwrap().read_holding_registers(def.address, def.count),
                )
                .await;
                match read {
                    Ok(Ok(Ok(values))) if values.len() == 2 => {
                        return Ok([values[0], values[1]]);
                    }
                    Ok(Ok(Ok(_))) => {
                        last_err = Some(EdgeError::SchemaMismatch(format!(
                            "register '{name}' returned unexpected width"
                        )));
                    }
                    Ok(Ok(Err(e))) => {
                        last_err = Some(EdgeError::Transport {
                            register: name.to_string(),
                            source: e.into(),
                        });
                        *guard = None;
                    }
                    Ok(Err(e)) => {
                        last_err = Some(EdgeError::Transport {
                            register: name.to_string(),
                            source: e.into(),
                        });
                        *guard = None;
                    }
                    Err(_) => {
                        last_err = Some(EdgeError::Transport {
                            register: name.to_string(),
                            source: anyhow::anyhow!("timed out after {}ms", self.retry.timeout_ms),
                        });
                        *guard = None;
                    }
                }
            }
            drop(guard);
            if attempt < self.retry.retry_count {
                let delay = self.retry.retry_delay_ms * (1u64 << attempt);
                tokio::time::sleep(StdDuration::from_millis(delay)).await;
            }
        }
        Err(last_err.unwrap_or_else(|| EdgeError::Transport {
            register: name.to_string(),
            source: anyhow::anyhow!("exhausted retries"),
        }))
    }

    fn read_scaled(&self, name: &str, registers: [u16; 2]) -> f64 {
        let scale = self
            .register_map
            .get(name)
            .map(|d| d.scale)
            .unwrap_or(1.0);
        decode_f32(registers) as f64 * scale
    }
}

#[async_trait]
impl FieldbusTransport for ModbusTransport {
    async fn read_telemetry(&self) -> EdgeResult<Option<TelemetrySnapshot>> {
        let names = [
            "soc",
            "soh",
            "pack_voltage",
            "pack_current",
            "active_power",
            "cell_temp_min",
            "cell_temp_max",
            "cell_temp_avg",
            "grid_frequency",
            "grid_voltage",
            "cell_voltage_min",
            "cell_voltage_max",
        ];
        let mut values = Vec::with_capacity(names.len());
        for name in names {
            match self.read_register_retried(name).await {
                Ok(raw) => values.push(self.read_scaled(name, raw)),
                Err(e) => {
                    error!(register = name, error = %e, "fieldbus read failed, skipping cycle telemetry");
                    return Ok(None);
                }
            }
        }
        Ok(Some(TelemetrySnapshot {
            timestamp: Utc::now(),
            soc_percent: values[0],
            soh_percent: values[1],
            pack_voltage_v: values[2],
            pack_current_a: values[3],
            active_power_kw: values[4],
            cell_temp_min_c: values[5],
            cell_temp_max_c: values[6],
            cell_temp_avg_c: values[7],
            grid_frequency_hz: values[8],
            grid_voltage_v: values[9],
            cell_voltage_min_v: values[10],
            cell_voltage_max_v: values[11],
            max_charge_current_a: 200.0,
            max_discharge_current_a: 200.0,
        }))
    }

    async fn set_power(&self, signed_kw: f64) -> EdgeResult<()> {
        let def = self
            .register_map
            .get("set_power")
            .ok_or_else(|| EdgeError::SchemaMismatch("missing 'set_power' register".to_string()))?;
        let registers = encode_f32(signed_kw as f32);
        let mut guard = self.ctx.lock().await;
        self.ensure_connected(&mut guard).await?;
        let write = timeout(
            StdDuration::from_millis(self.retry.timeout_ms),
            guard
                .as_mut()
                .unwrap()
                .write_multiple_registers(def.address, &registers),
        )
        .await;
        match write {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => {
                *guard = None;
                Err(EdgeError::Transport {
                    register: "set_power".to_string(),
                    source: e.into(),
                })
            }
            Ok(Err(e)) => {
                *guard = None;
                Err(EdgeError::Transport {
                    register: "set_power".to_string(),
                    source: e.into(),
                })
            }
            Err(_) => {
                *guard = None;
                Err(EdgeError::Transport {
                    register: "set_power".to_string(),
                    source: anyhow::anyhow!("timed out"),
                })
            }
        }
    }

    async fn set_coil(&self, name: &str, value: bool) -> EdgeResult<()> {
        let def = self
            .register_map
            .get(name)
            .ok_or_else(|| EdgeError::SchemaMismatch(format!("unknown coil '{name}'")))?;
        let mut guard = self.ctx.lock().await;
        self.ensure_connected(&mut guard).await?;
        let write = timeout(
            StdDuration::from_millis(self.retry.timeout_ms),
            guard.as_mut().unwrap().write_single_coil(def.address, value),
        )
        .await;
        match write {
            Ok(Ok(Ok(()))) => Ok(()),
            _ => {
                *guard = None;
                warn!(coil = name, "coil write failed");
                Err(EdgeError::Transport {
                    register: name.to_string(),
                    source: anyhow::anyhow!("coil write failed"),
                })
            }
        }
    }

    async fn emergency_stop(&self) -> EdgeResult<()> {
        self.set_coil("emergency_stop", true).await
    }
}

/// Shared handle to a single Modbus transport, used by components that
/// each need to issue independent I/O (control loop reads, black-start
/// writes contactor coils) against the same physical connection.
pub type SharedModbusTransport = Arc<ModbusTransport>;
