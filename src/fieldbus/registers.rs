use byteorder::{BigEndian, ByteOrder};
use serde::Deserialize;
use std::collections::HashMap;

/// Decode a big-endian IEEE-754 float32 from two consecutive 16-bit
/// holding registers (high word first).
pub fn decode_f32(registers: [u16; 2]) -> f32 {
    let mut buf = [0u8; 4];
    BigEndian::write_u16(&mut buf[0..2], registers[0]);
    BigEndian::write_u16(&mut buf[2..4], registers[1]);
    BigEndian::read_f32(&buf)
}

/// Inverse of [`decode_f32`].
pub fn encode_f32(value: f32) -> [u16; 2] {
    let mut buf = [0u8; 4];
    BigEndian::write_f32(&mut buf, value);
    [
        BigEndian::read_u16(&buf[0..2]),
        BigEndian::read_u16(&buf[2..4]),
    ]
}

/// One named register's location, width, and scale factor.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterDef {
    pub address: u16,
    #[serde(default = "default_float_count")]
    pub count: u16,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_float_count() -> u16 {
    2
}

fn default_scale() -> f64 {
    1.0
}

/// Name-to-address table loaded once at startup. Avoids hardcoding
/// register addresses into the transport implementation.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterMap {
    #[serde(flatten)]
    pub registers: HashMap<String, RegisterDef>,
}

impl RegisterMap {
    pub fn get(&self, name: &str) -> Option<&RegisterDef> {
        self.registers.get(name)
    }

    /// The built-in map matching this controller's default register
    /// layout; site deployments may override it with a TOML file of the
    /// same shape.
    pub fn default_map() -> Self {
        let entries: &[(&str, u16)] = &[
            ("soc", 0x0100),
            ("soh", 0x0102),
            ("pack_voltage", 0x0104),
            ("pack_current", 0x0106),
            ("active_power", 0x0108),
            ("cell_temp_min", 0x010A),
            ("cell_temp_max", 0x010C),
            ("cell_temp_avg", 0x010E),
            ("grid_frequency", 0x0110),
            ("grid_voltage", 0x0112),
            ("cell_voltage_min", 0x0114),
            ("cell_voltage_max", 0x0116),
            ("set_power", 0x0000),
        ];
        let mut registers: HashMap<String, RegisterDef> = entries
            .iter()
            .map(|(name, addr)| {
                (
                    name.to_string(),
                    RegisterDef {
                        address: *addr,
                        count: 2,
                        scale: 1.0,
                    },
                )
            })
            .collect();

        let coils: &[(&str, u16)] = &[
            ("emergency_stop", 0x0000),
            ("charge_enable", 0x0001),
            ("discharge_enable", 0x0002),
            ("grid_contactor", 0x0003),
            ("backup_contactor", 0x0004),
        ];
        for (name, addr) in coils {
            registers.insert(
                name.to_string(),
                RegisterDef {
                    address: *addr,
                    count: 1,
                    scale: 1.0,
                },
            );
        }

        Self { registers }
    }

    /// Load a site-specific register map from a TOML file, overriding
    /// the built-in defaults where the file defines a name.
    pub fn load_from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let map: RegisterMap = toml::from_str(&text)?;
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decode_matches_known_encoding() {
        // 220.0f32 big-endian: 0x43_5C_00_00
        let registers = [0x435C, 0x0000];
        assert!((decode_f32(registers) - 220.0).abs() < f32::EPSILON);
    }

    #[test]
    fn default_map_has_telemetry_registers() {
        let map = RegisterMap::default_map();
        assert_eq!(map.get("soc").unwrap().address, 0x0100);
        assert!(map.get("nonexistent").is_none());
    }

    #[test]
    fn default_map_has_all_coils() {
        let map = RegisterMap::default_map();
        for name in [
            "emergency_stop",
            "charge_enable",
            "discharge_enable",
            "grid_contactor",
            "backup_contactor",
        ] {
            assert!(map.get(name).is_some(), "missing coil '{name}'");
        }
    }

    proptest! {
        #[test]
        fn float_round_trips_through_registers(v in -1.0e6f32..1.0e6f32) {
            let registers = encode_f32(v);
            let decoded = decode_f32(registers);
            prop_assert!((decoded - v).abs() <= v.abs() * 1e-6 + 1e-3);
        }
    }
}
