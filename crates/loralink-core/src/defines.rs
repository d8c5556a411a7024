/*!
 * Reader for the firmware's compile-time `#define` table.
 *
 * The transceiver firmware keeps its radio profile in `lib/lora_config.hpp`.
 * Front-ends show the mesh profile from that file so the user knows what the
 * board was built with; changing it requires a rebuild.
 */
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::Result;

/// Default location of the firmware configuration header
pub const DEFAULT_DEFINES_FILE: &str = "lib/lora_config.hpp";

/// `#define` name/value pairs read from a C header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defines(HashMap<String, String>);

/// Radio profile used when the firmware is built mesh-compatible
#[derive(Debug, Clone, PartialEq)]
pub struct MeshProfile {
    /// Bandwidth in kHz
    pub bandwidth_khz: f64,
    /// Spreading factor
    pub spreading_factor: u8,
    /// Coding rate denominator
    pub coding_rate: u8,
    /// LoRa sync word
    pub sync_word: u8,
    /// Frequency in MHz
    pub frequency_mhz: f64,
}

impl Defines {
    /// Parse header text
    pub fn parse(text: &str) -> Self {
        let mut defines = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            let Some(rest) = line.strip_prefix("#define") else {
                continue;
            };
            let rest = rest.split_once("//").map_or(rest, |(code, _)| code);
            let mut parts = rest.split_whitespace();
            let (Some(key), Some(first)) = (parts.next(), parts.next()) else {
                continue;
            };
            let value = std::iter::once(first).chain(parts).collect::<Vec<_>>().join(" ");
            defines.insert(key.to_string(), value);
        }
        Self(defines)
    }

    /// Read a header file; a missing file gives an empty table
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No defines file at {}", path.display());
            return Ok(Self::default());
        }
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Look up a define
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Number of defines read
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no defines were read
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The mesh radio profile, if the firmware is built mesh-compatible
    pub fn mesh_profile(&self) -> Option<MeshProfile> {
        if self.get("MESH_COMPATIBLE").unwrap_or("0") != "1" {
            return None;
        }
        Some(MeshProfile {
            bandwidth_khz: self.number("MESH_BANDWIDTH").unwrap_or(250.0),
            spreading_factor: self.number("MESH_SPREADING_FACTOR").unwrap_or(7.0) as u8,
            coding_rate: self.number("MESH_CODING_RATE").unwrap_or(5.0) as u8,
            sync_word: self
                .get("MESH_SYNC_WORD")
                .and_then(parse_hex_byte)
                .unwrap_or(0x2B),
            frequency_mhz: self.number("MESH_FREQUENCY").unwrap_or(869.075),
        })
    }

    fn number(&self, key: &str) -> Option<f64> {
        let raw = self.get(key)?;
        let raw = raw.trim_matches(|c| c == '(' || c == ')');
        raw.trim_end_matches('f').parse().ok()
    }
}

fn parse_hex_byte(raw: &str) -> Option<u8> {
    let raw = raw.trim_matches(|c| c == '(' || c == ')');
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"
#pragma once
#define LORA_FREQUENCY 869.075f
#define LORA_POWER 20
#define MESH_COMPATIBLE 1
#define MESH_BANDWIDTH 125 //
#define MESH_SPREADING_FACTOR 9
#define MESH_SYNC_WORD 0x12
//#define DISABLED 1
"#;

    #[test]
    fn test_parse() {
        let defines = Defines::parse(HEADER);
        assert_eq!(defines.get("LORA_POWER"), Some("20"));
        assert_eq!(defines.get("MESH_BANDWIDTH"), Some("125"));
        assert_eq!(defines.get("DISABLED"), None);
        assert_eq!(defines.len(), 6);
    }

    #[test]
    fn test_mesh_profile() {
        let profile = Defines::parse(HEADER).mesh_profile().unwrap();
        assert_eq!(profile.bandwidth_khz, 125.0);
        assert_eq!(profile.spreading_factor, 9);
        assert_eq!(profile.coding_rate, 5);
        assert_eq!(profile.sync_word, 0x12);
        assert_eq!(profile.frequency_mhz, 869.075);
    }

    #[test]
    fn test_trailing_comments_are_dropped() {
        let header = "\
#define SX126X_DIO2_AS_RF_SWITCH
#define LORA_STATUS_INTERVAL_SEC 10  // Default interval for LoRa status packets in seconds
#define MESH_COMPATIBLE 1  // If 1, set BW/SF/CR/sync to match Meshtastic SHORT_FAST
#define MESH_SYNC_WORD 0x2B  // Private Meshtastic sync word
#define MESH_FREQUENCY 869.075f  // Frequency to use for Mesh compatibility
#define MESH_BANDWIDTH 250  // Bandwidth for Mesh (original narrow)
#define MESH_SPREADING_FACTOR 11  // SF for Mesh
#define MESH_CODING_RATE 5  // CR for Mesh
#define WIFI_FIXED_MAC_ADDRESS {0x1c, 0xdb, 0xd4, 0xC3, 0xC9, 0xD4} 
";
        let defines = Defines::parse(header);
        assert_eq!(defines.get("SX126X_DIO2_AS_RF_SWITCH"), None);
        assert_eq!(defines.get("LORA_STATUS_INTERVAL_SEC"), Some("10"));
        assert_eq!(defines.get("MESH_COMPATIBLE"), Some("1"));
        assert_eq!(
            defines.get("WIFI_FIXED_MAC_ADDRESS"),
            Some("{0x1c, 0xdb, 0xd4, 0xC3, 0xC9, 0xD4}")
        );

        let profile = defines.mesh_profile().unwrap();
        assert_eq!(profile.bandwidth_khz, 250.0);
        assert_eq!(profile.spreading_factor, 11);
        assert_eq!(profile.coding_rate, 5);
        assert_eq!(profile.sync_word, 0x2B);
        assert_eq!(profile.frequency_mhz, 869.075);
    }

    #[test]
    fn test_mesh_disabled() {
        let defines = Defines::parse("#define MESH_COMPATIBLE 0\n");
        assert!(defines.mesh_profile().is_none());
        assert!(Defines::default().mesh_profile().is_none());
    }

    #[test]
    fn test_missing_file() {
        let defines = Defines::load("/nonexistent/lora_config.hpp").unwrap();
        assert!(defines.is_empty());
    }
}
