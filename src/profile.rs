//! Machine profile: the decoded configuration object the core accepts
//! but never produces (`spec.md` §6).
//!
//! Built on `serde`/`serde_json`, the same pairing used for other
//! configuration structures in this codebase; this module is the
//! profile-loader-facing surface, deserialized from JSON by a caller and
//! handed to the machine at construction time (`spec.md` §4.8).

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

/// Accepts a JSON number or a decimal/`0x`-prefixed hex string
/// (`spec.md` §6: "All numeric fields accept decimal or `0x`-prefixed
/// hexadecimal").
pub fn flexible_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct FlexibleU64Visitor;

    impl<'de> Visitor<'de> for FlexibleU64Visitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a decimal integer, or a string in decimal or 0x-hex form")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(|_| E::custom(format!("negative numeric field: {v}")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            parse_flexible(v).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(FlexibleU64Visitor)
}

/// Same as [`flexible_u64`] but for `Option<u64>` fields.
pub fn flexible_u64_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "flexible_u64")] u64);

    Option::<Wrapper>::deserialize(deserializer).map(|w| w.map(|w| w.0))
}

fn parse_flexible(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("invalid hex literal '{s}': {e}"))
    } else {
        s.parse::<u64>().map_err(|e| format!("invalid decimal literal '{s}': {e}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuType {
    #[serde(rename = "6502")]
    Mos6502,
    #[serde(rename = "65C02")]
    W65C02,
    #[serde(rename = "65816")]
    W65816,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CpuSpec {
    #[serde(rename = "type")]
    pub cpu_type: CpuType,
    #[serde(default, deserialize_with = "flexible_u64_opt")]
    pub clock_speed_hz: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationFailurePolicy {
    Stop,
    Fallback,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RomImageSpec {
    pub name: String,
    pub source_uri: String,
    #[serde(deserialize_with = "flexible_u64")]
    pub expected_size_bytes: u64,
    pub required: bool,
    pub on_verification_fail: VerificationFailurePolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RomSourceSpec {
    pub rom_image_name: String,
    #[serde(deserialize_with = "flexible_u64")]
    pub offset_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhysicalMemorySpec {
    pub name: String,
    #[serde(deserialize_with = "flexible_u64")]
    pub size_bytes: u64,
    #[serde(default)]
    pub fill: Option<u8>,
    #[serde(default)]
    pub sources: Vec<RomSourceSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryRegionType {
    Ram,
    Rom,
    Composite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryRegionSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub region_type: MemoryRegionType,
    #[serde(deserialize_with = "flexible_u64")]
    pub start: u64,
    #[serde(deserialize_with = "flexible_u64")]
    pub size: u64,
    /// A `|`-delimited subset of `r`, `w`, `x` (e.g. `"r|w"`).
    pub permissions: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub handler: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotherboardDeviceType {
    Keyboard,
    Video,
    Character,
    Speaker,
    Languagecard,
    Extended80column,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MotherboardDeviceSpec {
    #[serde(rename = "type")]
    pub device_type: MotherboardDeviceType,
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotCardSpec {
    pub slot: u8,
    #[serde(rename = "type")]
    pub card_type: String,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotsSpec {
    pub io_region_name: String,
    pub enabled: bool,
    pub internal_c3_rom: bool,
    pub internal_cx_rom: bool,
    #[serde(default)]
    pub cards: Vec<SlotCardSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootSpec {
    pub auto_start: bool,
    pub auto_video_window_open: bool,
    #[serde(default)]
    pub startup_slot: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemorySpec {
    #[serde(default)]
    pub rom_images: Vec<RomImageSpec>,
    #[serde(default)]
    pub physical: Vec<PhysicalMemorySpec>,
    #[serde(default)]
    pub regions: Vec<MemoryRegionSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevicesSpec {
    #[serde(default)]
    pub motherboard: Vec<MotherboardDeviceSpec>,
    pub slots: SlotsSpec,
}

/// The top-level decoded machine profile (`spec.md` §6).
#[derive(Debug, Clone, Deserialize)]
pub struct MachineProfile {
    pub cpu: CpuSpec,
    #[serde(deserialize_with = "flexible_u64")]
    pub address_space_bits: u64,
    pub memory: MemorySpec,
    pub devices: DevicesSpec,
    pub boot: BootSpec,
}

impl MachineProfile {
    /// Parse a profile from its JSON text form.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_and_decimal_numeric_fields_both_parse() {
        let json = r#"{
            "cpu": {"type": "65C02", "clock_speed_hz": "1020484"},
            "address_space_bits": "0x10",
            "memory": {"rom_images": [], "physical": [], "regions": []},
            "devices": {"motherboard": [], "slots": {"io_region_name": "io", "enabled": true, "internal_c3_rom": false, "internal_cx_rom": false, "cards": []}},
            "boot": {"auto_start": true, "auto_video_window_open": false, "startup_slot": 6}
        }"#;
        let profile = MachineProfile::from_json(json).unwrap();
        assert_eq!(profile.address_space_bits, 16);
        assert_eq!(profile.cpu.clock_speed_hz, Some(1_020_484));
        assert_eq!(profile.boot.startup_slot, Some(6));
        assert!(matches!(profile.cpu.cpu_type, CpuType::W65C02));
    }

    #[test]
    fn plain_numeric_json_values_also_parse() {
        let json = r#"{
            "cpu": {"type": "6502"},
            "address_space_bits": 16,
            "memory": {"rom_images": [{"name": "rom", "source_uri": "embedded://rom", "expected_size_bytes": 12288, "required": true, "on_verification_fail": "stop"}], "physical": [], "regions": []},
            "devices": {"motherboard": [], "slots": {"io_region_name": "io", "enabled": false, "internal_c3_rom": false, "internal_cx_rom": false, "cards": []}},
            "boot": {"auto_start": false, "auto_video_window_open": false}
        }"#;
        let profile = MachineProfile::from_json(json).unwrap();
        assert_eq!(profile.address_space_bits, 16);
        assert_eq!(profile.memory.rom_images[0].expected_size_bytes, 12288);
    }
}
