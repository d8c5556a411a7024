/*!
 * Core data types for LoRaLink.
 *
 * This module defines the value types that describe a transceiver's
 * configuration, and the `DeviceState` record that mirrors it on the host.
 */
use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Transmit gain accepted by the radio, in dBm
pub const GAIN_RANGE: RangeInclusive<i8> = -9..=22;

/// Spreading factors accepted by the radio
pub const SPREADING_FACTOR_RANGE: RangeInclusive<u8> = 5..=12;

/// HTTP status shown when the device reports WiFi as down
pub const HTTP_WIFI_DISABLED: &str = "WiFi disabled";

/// HTTP status shown before the device has reported anything
pub const HTTP_NO_DATA: &str = "No data";

/// LoRa channel bandwidth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum Bandwidth {
    /// 7.8 kHz
    Khz7_8,
    /// 10.4 kHz
    Khz10_4,
    /// 15.6 kHz
    Khz15_6,
    /// 20.8 kHz
    Khz20_8,
    /// 31.25 kHz
    Khz31_25,
    /// 41.7 kHz
    Khz41_7,
    /// 62.5 kHz
    Khz62_5,
    /// 125 kHz
    Khz125,
    /// 250 kHz
    Khz250,
    /// 500 kHz
    Khz500,
}

impl Bandwidth {
    /// Every bandwidth the radio supports, narrowest first
    pub const ALL: [Bandwidth; 10] = [
        Bandwidth::Khz7_8,
        Bandwidth::Khz10_4,
        Bandwidth::Khz15_6,
        Bandwidth::Khz20_8,
        Bandwidth::Khz31_25,
        Bandwidth::Khz41_7,
        Bandwidth::Khz62_5,
        Bandwidth::Khz125,
        Bandwidth::Khz250,
        Bandwidth::Khz500,
    ];

    /// Bandwidth in kHz
    pub fn khz(self) -> f64 {
        match self {
            Bandwidth::Khz7_8 => 7.8,
            Bandwidth::Khz10_4 => 10.4,
            Bandwidth::Khz15_6 => 15.6,
            Bandwidth::Khz20_8 => 20.8,
            Bandwidth::Khz31_25 => 31.25,
            Bandwidth::Khz41_7 => 41.7,
            Bandwidth::Khz62_5 => 62.5,
            Bandwidth::Khz125 => 125.0,
            Bandwidth::Khz250 => 250.0,
            Bandwidth::Khz500 => 500.0,
        }
    }

    /// Look up a bandwidth from a kHz value.
    ///
    /// The firmware prints floats with two decimals ("7.80", "250.00"), so the
    /// match tolerates rounding noise.
    pub fn from_khz(khz: f64) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|bw| (bw.khz() - khz).abs() < 0.01)
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.khz())
    }
}

impl TryFrom<f64> for Bandwidth {
    type Error = Error;

    fn try_from(khz: f64) -> Result<Self> {
        Self::from_khz(khz)
            .ok_or_else(|| Error::invalid_value(format!("unsupported bandwidth {} kHz", khz)))
    }
}

impl From<Bandwidth> for f64 {
    fn from(bw: Bandwidth) -> Self {
        bw.khz()
    }
}

/// Interval between automatic LoRa status packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum StatusInterval {
    /// Every 10 seconds
    Secs10,
    /// Every 30 seconds
    Secs30,
    /// Every minute
    Secs60,
    /// Every two minutes
    Secs120,
    /// Every three minutes
    Secs180,
}

impl StatusInterval {
    /// Every interval the firmware accepts
    pub const ALL: [StatusInterval; 5] = [
        StatusInterval::Secs10,
        StatusInterval::Secs30,
        StatusInterval::Secs60,
        StatusInterval::Secs120,
        StatusInterval::Secs180,
    ];

    /// Interval in seconds
    pub fn secs(self) -> u32 {
        match self {
            StatusInterval::Secs10 => 10,
            StatusInterval::Secs30 => 30,
            StatusInterval::Secs60 => 60,
            StatusInterval::Secs120 => 120,
            StatusInterval::Secs180 => 180,
        }
    }

    /// Look up an interval from a number of seconds
    pub fn from_secs(secs: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|i| i.secs() == secs)
    }
}

impl fmt::Display for StatusInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.secs())
    }
}

impl TryFrom<u32> for StatusInterval {
    type Error = Error;

    fn try_from(secs: u32) -> Result<Self> {
        Self::from_secs(secs)
            .ok_or_else(|| Error::invalid_value(format!("unsupported status interval {}s", secs)))
    }
}

impl From<StatusInterval> for u32 {
    fn from(interval: StatusInterval) -> Self {
        interval.secs()
    }
}

/// When the device POSTs collected packets to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostMode {
    /// On a fixed timer
    #[serde(rename = "time")]
    Periodic,
    /// Whenever a LoRa packet is received
    #[serde(rename = "lora")]
    OnReceive,
}

impl PostMode {
    /// Token used on the wire
    pub fn token(self) -> &'static str {
        match self {
            PostMode::Periodic => "time",
            PostMode::OnReceive => "lora",
        }
    }

    /// Parse a wire token
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "time" => Some(PostMode::Periodic),
            "lora" => Some(PostMode::OnReceive),
            _ => None,
        }
    }
}

impl fmt::Display for PostMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// WiFi link state as last reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WifiConnection {
    /// WiFi is switched off or has not been queried yet
    Off,
    /// WiFi was just enabled and has not reported back
    Connecting,
    /// The device is associated with an access point
    Connected,
    /// WiFi is enabled but not associated
    NotConnected,
}

impl fmt::Display for WifiConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WifiConnection::Off => "OFF",
            WifiConnection::Connecting => "Connecting...",
            WifiConnection::Connected => "Connected",
            WifiConnection::NotConnected => "Not Connected",
        };
        f.write_str(label)
    }
}

/// Identifies one field of [`DeviceState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateField {
    /// Transmit gain
    Gain,
    /// Carrier frequency
    Frequency,
    /// Spreading factor
    SpreadingFactor,
    /// Channel bandwidth
    Bandwidth,
    /// Periodic status packets on/off
    StatusEnabled,
    /// Periodic status interval
    StatusInterval,
    /// WiFi enabled on the device
    WifiEnabled,
    /// POST trigger mode
    PostMode,
    /// WiFi link state
    WifiConnection,
    /// Last HTTP outcome
    HttpStatus,
}

/// Host-side mirror of a transceiver's configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Transmit gain in dBm
    pub gain: i8,
    /// Carrier frequency in MHz
    pub frequency_mhz: f64,
    /// LoRa spreading factor
    pub spreading_factor: u8,
    /// LoRa bandwidth
    pub bandwidth: Bandwidth,
    /// Whether the device sends periodic status packets
    pub status_enabled: bool,
    /// Interval between status packets
    pub status_interval: StatusInterval,
    /// Whether WiFi is enabled on the device
    pub wifi_enabled: bool,
    /// When the device POSTs to the server
    pub post_mode: PostMode,
    /// WiFi link state
    pub wifi_connection: WifiConnection,
    /// Last HTTP outcome reported by the device
    pub http_status: String,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            gain: 20,
            frequency_mhz: 868.075,
            spreading_factor: 11,
            bandwidth: Bandwidth::Khz250,
            status_enabled: false,
            status_interval: StatusInterval::Secs30,
            wifi_enabled: true,
            post_mode: PostMode::Periodic,
            wifi_connection: WifiConnection::Off,
            http_status: HTTP_NO_DATA.to_string(),
        }
    }
}

/// Check a gain value against [`GAIN_RANGE`]
pub fn validate_gain(gain: i8) -> Result<i8> {
    if GAIN_RANGE.contains(&gain) {
        Ok(gain)
    } else {
        Err(Error::invalid_value(format!(
            "gain {} dBm outside {}..={}",
            gain,
            GAIN_RANGE.start(),
            GAIN_RANGE.end()
        )))
    }
}

/// Check a spreading factor against [`SPREADING_FACTOR_RANGE`]
pub fn validate_spreading_factor(sf: u8) -> Result<u8> {
    if SPREADING_FACTOR_RANGE.contains(&sf) {
        Ok(sf)
    } else {
        Err(Error::invalid_value(format!(
            "spreading factor {} outside {}..={}",
            sf,
            SPREADING_FACTOR_RANGE.start(),
            SPREADING_FACTOR_RANGE.end()
        )))
    }
}

/// Check that a frequency is a finite, positive number of MHz
pub fn validate_frequency(mhz: f64) -> Result<f64> {
    if mhz.is_finite() && mhz > 0.0 {
        Ok(mhz)
    } else {
        Err(Error::invalid_value(format!("frequency {} MHz is not valid", mhz)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bandwidth_lookup() {
        assert_eq!(Bandwidth::from_khz(250.0), Some(Bandwidth::Khz250));
        assert_eq!(Bandwidth::from_khz(7.80), Some(Bandwidth::Khz7_8));
        assert_eq!(Bandwidth::from_khz(31.25), Some(Bandwidth::Khz31_25));
        assert_eq!(Bandwidth::from_khz(100.0), None);

        assert_eq!(Bandwidth::Khz125.to_string(), "125");
        assert_eq!(Bandwidth::Khz41_7.to_string(), "41.7");
    }

    #[test]
    fn test_status_interval_lookup() {
        assert_eq!(StatusInterval::from_secs(60), Some(StatusInterval::Secs60));
        assert_eq!(StatusInterval::from_secs(45), None);
        assert!(StatusInterval::try_from(15).is_err());
    }

    #[test]
    fn test_post_mode_tokens() {
        assert_eq!(PostMode::from_token("time"), Some(PostMode::Periodic));
        assert_eq!(PostMode::from_token("lora"), Some(PostMode::OnReceive));
        assert_eq!(PostMode::from_token("never"), None);
        assert_eq!(PostMode::OnReceive.to_string(), "lora");
    }

    #[test]
    fn test_default_state() {
        let state = DeviceState::default();
        assert_eq!(state.gain, 20);
        assert_eq!(state.spreading_factor, 11);
        assert_eq!(state.bandwidth, Bandwidth::Khz250);
        assert_eq!(state.wifi_connection, WifiConnection::Off);
        assert_eq!(state.http_status, HTTP_NO_DATA);
    }

    #[test]
    fn test_validators() {
        assert!(validate_gain(-9).is_ok());
        assert!(validate_gain(22).is_ok());
        assert!(validate_gain(23).is_err());
        assert!(validate_spreading_factor(4).is_err());
        assert!(validate_spreading_factor(12).is_ok());
        assert!(validate_frequency(869.075).is_ok());
        assert!(validate_frequency(f64::NAN).is_err());
    }

    #[test]
    fn test_serde_uses_wire_values() {
        let json = serde_json::to_string(&Bandwidth::Khz62_5).unwrap();
        assert_eq!(json, "62.5");
        let bw: Bandwidth = serde_json::from_str("125").unwrap();
        assert_eq!(bw, Bandwidth::Khz125);
        assert!(serde_json::from_str::<Bandwidth>("126").is_err());

        let mode: PostMode = serde_json::from_str("\"lora\"").unwrap();
        assert_eq!(mode, PostMode::OnReceive);
    }
}
