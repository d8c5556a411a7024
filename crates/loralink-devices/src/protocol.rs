/*!
 * Line protocol spoken by LoRaLink transceivers.
 *
 * Outbound, every [`Command`] renders to exactly one ASCII line. Inbound,
 * [`classify`] maps any received line to an [`InboundEvent`] using an ordered
 * table of prefix rules; the first rule whose prefix matches decides, and a
 * value that does not parse turns the line back into plain log text.
 * Classification never fails.
 */
use std::fmt;

use serde::Serialize;

use loralink_core::types::{
    validate_frequency, validate_gain, validate_spreading_factor, Bandwidth, PostMode,
    StateField, StatusInterval, WifiConnection,
};

/// Substrings that mark a line as radio activity
pub const ACTIVITY_KEYWORDS: [&str; 4] = ["Transmitting", "Received", "Tx done:", "Data sent"];

/// Substrings that route an unmatched line to the debug log as well
pub const DEBUG_KEYWORDS: [&str; 6] = ["settings", "defines", "WiFi", "HTTP", "SPIFFS", "Control"];

/// A value the host can ask the device for with `get`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    /// Network credentials and build info, answered as free-form lines
    DebugInfo,
    /// Transmit gain
    Gain,
    /// Carrier frequency
    Freq,
    /// Spreading factor
    Sf,
    /// Bandwidth
    Bw,
    /// Status packets on/off
    Status,
    /// Status packet interval
    Interval,
    /// WiFi enabled
    WifiEn,
    /// POST trigger mode
    PostMode,
    /// Compile-time POST-on-receive flag
    PostEn,
    /// WiFi association state
    WifiStatus,
    /// Last HTTP outcome
    HttpStatus,
}

impl Query {
    /// Field name on the wire
    pub fn name(self) -> &'static str {
        match self {
            Query::DebugInfo => "debug_info",
            Query::Gain => "gain",
            Query::Freq => "freq",
            Query::Sf => "sf",
            Query::Bw => "bw",
            Query::Status => "status",
            Query::Interval => "interval",
            Query::WifiEn => "wifi_en",
            Query::PostMode => "post_mode",
            Query::PostEn => "post_en",
            Query::WifiStatus => "wifi_status",
            Query::HttpStatus => "http_status",
        }
    }
}

/// Configuration queries issued after `get debug_info` when a session syncs
pub const SYNC_QUERIES: [Query; 9] = [
    Query::Gain,
    Query::Freq,
    Query::Sf,
    Query::Bw,
    Query::Status,
    Query::Interval,
    Query::WifiEn,
    Query::PostMode,
    Query::PostEn,
];

/// Queries issued by a status poll, in order
pub const STATUS_QUERIES: [Query; 2] = [Query::WifiStatus, Query::HttpStatus];

/// A radio parameter changed with `command update`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tuning {
    /// Transmit gain in dBm
    Gain(i8),
    /// Carrier frequency in MHz
    FrequencyMhz(f64),
    /// Spreading factor
    SpreadingFactor(u8),
    /// Bandwidth
    BandwidthKhz(Bandwidth),
}

impl Tuning {
    /// Field name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Tuning::Gain(_) => "gain",
            Tuning::FrequencyMhz(_) => "freqMhz",
            Tuning::SpreadingFactor(_) => "sf",
            Tuning::BandwidthKhz(_) => "bwKHz",
        }
    }
}

impl fmt::Display for Tuning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tuning::Gain(v) => write!(f, "{} {}", self.name(), v),
            Tuning::FrequencyMhz(v) => write!(f, "{} {}", self.name(), v),
            Tuning::SpreadingFactor(v) => write!(f, "{} {}", self.name(), v),
            Tuning::BandwidthKhz(v) => write!(f, "{} {}", self.name(), v),
        }
    }
}

/// A behaviour switch changed with `command set`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    /// Periodic status packets
    Status(bool),
    /// Status packet interval
    Interval(StatusInterval),
    /// WiFi radio
    WifiEnabled(bool),
    /// POST trigger mode
    PostMode(PostMode),
}

impl Flag {
    /// Field name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Flag::Status(_) => "status",
            Flag::Interval(_) => "interval",
            Flag::WifiEnabled(_) => "wifi_en",
            Flag::PostMode(_) => "post_mode",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flag::Status(v) | Flag::WifiEnabled(v) => write!(f, "{} {}", self.name(), u8::from(*v)),
            Flag::Interval(v) => write!(f, "{} {}", self.name(), v),
            Flag::PostMode(v) => write!(f, "{} {}", self.name(), v.token()),
        }
    }
}

/// An outbound command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `get <field>`
    Get(Query),
    /// `command update <field> <value>`
    SetUpdate(Tuning),
    /// `command set <field> <value>`
    SetFlag(Flag),
    /// `data <payload>`, sent over LoRa by the device
    Data(String),
    /// `flash`, dump and erase the on-device log
    FlashRead,
}

impl Command {
    /// The line to write, without terminator
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Get(query) => write!(f, "get {}", query.name()),
            Command::SetUpdate(tuning) => write!(f, "command update {}", tuning),
            Command::SetFlag(flag) => write!(f, "command set {}", flag),
            Command::Data(payload) => write!(f, "data {}", payload),
            Command::FlashRead => f.write_str("flash"),
        }
    }
}

/// A configuration value reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum ConfigValue {
    /// `gain <dBm>`
    Gain(i8),
    /// `freq <MHz>`
    Frequency(f64),
    /// `sf <n>`
    SpreadingFactor(u8),
    /// `bw <kHz>`
    Bandwidth(Bandwidth),
    /// `status <0|1>`
    StatusEnabled(bool),
    /// `interval <s>`
    StatusInterval(StatusInterval),
    /// `wifi_en <0|1>`
    WifiEnabled(bool),
    /// `post_mode <time|lora>`
    PostMode(PostMode),
    /// `post_en <0|1>`, informational only
    PostEnabled(bool),
}

impl ConfigValue {
    /// The state field this value belongs to, if it is mirrored
    pub fn field(&self) -> Option<StateField> {
        match self {
            ConfigValue::Gain(_) => Some(StateField::Gain),
            ConfigValue::Frequency(_) => Some(StateField::Frequency),
            ConfigValue::SpreadingFactor(_) => Some(StateField::SpreadingFactor),
            ConfigValue::Bandwidth(_) => Some(StateField::Bandwidth),
            ConfigValue::StatusEnabled(_) => Some(StateField::StatusEnabled),
            ConfigValue::StatusInterval(_) => Some(StateField::StatusInterval),
            ConfigValue::WifiEnabled(_) => Some(StateField::WifiEnabled),
            ConfigValue::PostMode(_) => Some(StateField::PostMode),
            ConfigValue::PostEnabled(_) => None,
        }
    }
}

/// A status value reported by the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum StatusValue {
    /// `wifi_status <0|1>`
    Wifi(WifiConnection),
    /// `http_status <text>`
    Http(String),
}

/// What a received line means
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A mirrored configuration value
    ConfigSync(ConfigValue),
    /// A connectivity status
    StatusUpdate(StatusValue),
    /// Free text about radio traffic
    LoraActivity(String),
    /// Any other free text
    RawLog(String),
}

impl InboundEvent {
    /// Whether this is a free-text event tagged as radio activity
    pub fn is_activity(&self) -> bool {
        matches!(self, InboundEvent::LoraActivity(_))
    }
}

type Parse = fn(&str) -> Option<InboundEvent>;

struct Rule {
    prefix: &'static str,
    parse: Parse,
}

const RULES: &[Rule] = &[
    Rule { prefix: "wifi_status ", parse: parse_wifi_status },
    Rule { prefix: "http_status ", parse: parse_http_status },
    Rule { prefix: "gain ", parse: parse_gain },
    Rule { prefix: "freq ", parse: parse_freq },
    Rule { prefix: "sf ", parse: parse_sf },
    Rule { prefix: "bw ", parse: parse_bw },
    Rule { prefix: "status ", parse: parse_status },
    Rule { prefix: "interval ", parse: parse_interval },
    Rule { prefix: "wifi_en ", parse: parse_wifi_en },
    Rule { prefix: "post_mode ", parse: parse_post_mode },
    Rule { prefix: "post_en ", parse: parse_post_en },
];

fn token(rest: &str) -> Option<&str> {
    rest.split_whitespace().next()
}

fn flag_token(rest: &str) -> Option<bool> {
    match token(rest)? {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

fn config(value: ConfigValue) -> Option<InboundEvent> {
    Some(InboundEvent::ConfigSync(value))
}

fn parse_wifi_status(rest: &str) -> Option<InboundEvent> {
    let connection = match token(rest)? {
        "1" => WifiConnection::Connected,
        _ => WifiConnection::NotConnected,
    };
    Some(InboundEvent::StatusUpdate(StatusValue::Wifi(connection)))
}

fn parse_http_status(rest: &str) -> Option<InboundEvent> {
    let text = rest.trim();
    if text.is_empty() {
        return None;
    }
    Some(InboundEvent::StatusUpdate(StatusValue::Http(text.to_string())))
}

fn parse_gain(rest: &str) -> Option<InboundEvent> {
    let gain = token(rest)?.parse::<i8>().ok()?;
    config(ConfigValue::Gain(validate_gain(gain).ok()?))
}

fn parse_freq(rest: &str) -> Option<InboundEvent> {
    let mhz = token(rest)?.parse::<f64>().ok()?;
    config(ConfigValue::Frequency(validate_frequency(mhz).ok()?))
}

fn parse_sf(rest: &str) -> Option<InboundEvent> {
    let sf = token(rest)?.parse::<u8>().ok()?;
    config(ConfigValue::SpreadingFactor(validate_spreading_factor(sf).ok()?))
}

fn parse_bw(rest: &str) -> Option<InboundEvent> {
    let khz = token(rest)?.parse::<f64>().ok()?;
    config(ConfigValue::Bandwidth(Bandwidth::from_khz(khz)?))
}

fn parse_status(rest: &str) -> Option<InboundEvent> {
    config(ConfigValue::StatusEnabled(flag_token(rest)?))
}

fn parse_interval(rest: &str) -> Option<InboundEvent> {
    let secs = token(rest)?.parse::<u32>().ok()?;
    config(ConfigValue::StatusInterval(StatusInterval::from_secs(secs)?))
}

fn parse_wifi_en(rest: &str) -> Option<InboundEvent> {
    config(ConfigValue::WifiEnabled(flag_token(rest)?))
}

fn parse_post_mode(rest: &str) -> Option<InboundEvent> {
    config(ConfigValue::PostMode(PostMode::from_token(token(rest)?)?))
}

fn parse_post_en(rest: &str) -> Option<InboundEvent> {
    config(ConfigValue::PostEnabled(flag_token(rest)?))
}

/// Whether `text` reports radio traffic
pub fn is_activity(text: &str) -> bool {
    ACTIVITY_KEYWORDS.iter().any(|k| text.contains(k))
}

/// Whether `text` is device housekeeping worth keeping in the debug log
pub fn is_debug_related(text: &str) -> bool {
    DEBUG_KEYWORDS.iter().any(|k| text.contains(k))
}

fn free_text(line: &str) -> InboundEvent {
    if is_activity(line) {
        InboundEvent::LoraActivity(line.to_string())
    } else {
        InboundEvent::RawLog(line.to_string())
    }
}

/// Classify one received line
pub fn classify(line: &str) -> InboundEvent {
    RULES
        .iter()
        .find_map(|rule| line.strip_prefix(rule.prefix).map(|rest| (rule, rest)))
        .and_then(|(rule, rest)| (rule.parse)(rest))
        .unwrap_or_else(|| free_text(line))
}
