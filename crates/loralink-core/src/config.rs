/*!
 * Configuration management for LoRaLink.
 *
 * Settings are layered: a fixed default record first, then an optional
 * persisted file (the `gui_config.json` written by earlier front-ends), then
 * `LORALINK_*` environment variables, with `__` between nested keys
 * (`LORALINK_GAIN`, `LORALINK_TIMING__SETTLE_MS`). Keys missing from a layer fall through
 * to the one below it and unknown keys are ignored, so old and new files both
 * load.
 */
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{
    validate_frequency, validate_gain, validate_spreading_factor, Bandwidth, DeviceState,
    PostMode, StatusInterval, WifiConnection, HTTP_NO_DATA,
};

/// File name used when no configuration path is given
pub const DEFAULT_CONFIG_FILE: &str = "gui_config.json";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "LORALINK";

/// Top-level configuration.
///
/// The radio defaults sit at the top level under the key names the original
/// configuration file used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial transmit gain in dBm
    pub gain: i8,

    /// Initial carrier frequency in MHz
    pub freq: f64,

    /// Initial spreading factor
    pub spreading_factor: u8,

    /// Initial bandwidth
    pub bandwidth: Bandwidth,

    /// Whether periodic LoRa status packets start enabled
    pub lora_status_enabled: bool,

    /// Initial status packet interval
    pub lora_status_interval: StatusInterval,

    /// Whether WiFi starts enabled
    pub wifi_enabled: bool,

    /// Initial POST mode
    pub post_mode: PostMode,

    /// Only show LoRa activity in the main log
    pub log_short: bool,

    /// Serial port selection
    pub serial: SerialConfig,

    /// Protocol timing
    pub timing: TimingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Serial port selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port used when none is given explicitly
    #[serde(default = "default_port")]
    pub default_port: String,

    /// Substring a port name must contain to be offered
    #[serde(default = "default_port_filter")]
    pub port_filter: String,
}

/// Protocol timing, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Wait after opening the port for the boot banner to finish
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Gap between consecutive sync requests
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Read timeout of the reader loop; bounds disconnect latency
    #[serde(default = "default_poll_period_ms")]
    pub poll_period_ms: u64,

    /// Delay before re-checking WiFi after it was toggled
    #[serde(default = "default_wifi_recheck_ms")]
    pub wifi_recheck_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        let state = DeviceState::default();
        Self {
            gain: state.gain,
            freq: state.frequency_mhz,
            spreading_factor: state.spreading_factor,
            bandwidth: state.bandwidth,
            lora_status_enabled: state.status_enabled,
            lora_status_interval: state.status_interval,
            wifi_enabled: state.wifi_enabled,
            post_mode: state.post_mode,
            log_short: true,
            serial: SerialConfig::default(),
            timing: TimingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            default_port: default_port(),
            port_filter: default_port_filter(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            pacing_ms: default_pacing_ms(),
            poll_period_ms: default_poll_period_ms(),
            wifi_recheck_ms: default_wifi_recheck_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_port() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_port_filter() -> String {
    "ACM".to_string()
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_pacing_ms() -> u64 {
    50
}

fn default_poll_period_ms() -> u64 {
    100
}

fn default_wifi_recheck_ms() -> u64 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Build the device mirror's starting point from these settings
    pub fn initial_state(&self) -> DeviceState {
        DeviceState {
            gain: self.gain,
            frequency_mhz: self.freq,
            spreading_factor: self.spreading_factor,
            bandwidth: self.bandwidth,
            status_enabled: self.lora_status_enabled,
            status_interval: self.lora_status_interval,
            wifi_enabled: self.wifi_enabled,
            post_mode: self.post_mode,
            wifi_connection: WifiConnection::Off,
            http_status: HTTP_NO_DATA.to_string(),
        }
    }

    /// Check the radio defaults against the ranges the device accepts
    pub fn validate(&self) -> Result<()> {
        validate_gain(self.gain)?;
        validate_frequency(self.freq)?;
        validate_spreading_factor(self.spreading_factor)?;
        if self.timing.poll_period_ms == 0 {
            return Err(Error::config("timing.poll_period_ms must be greater than zero"));
        }
        Ok(())
    }

    /// Load a configuration file merged over the defaults.
    ///
    /// A missing file yields the defaults. A file that cannot be parsed, or
    /// whose values are out of range, is reported and ignored.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match ConfigBuilder::new()
            .with_config_file(path.as_ref())
            .with_environment_prefix(ENV_PREFIX)
            .build()
        {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Ignoring configuration file {}: {}",
                    path.as_ref().display(),
                    e
                );
                Self::default()
            }
        }
    }
}

impl TimingConfig {
    /// Settle delay as a duration
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Sync pacing as a duration
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// Reader poll period as a duration
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    /// WiFi re-check delay as a duration
    pub fn wifi_recheck(&self) -> Duration {
        Duration::from_millis(self.wifi_recheck_ms)
    }
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<PathBuf>,
    environment_prefix: Option<String>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        let default_config = Config::default();
        let mut config_builder = ConfigLib::builder().add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            if config_file.exists() {
                debug!("Loading configuration from {}", config_file.display());
                config_builder = config_builder.add_source(File::from(config_file));
            } else {
                debug!(
                    "Configuration file {} does not exist, using defaults",
                    config_file.display()
                );
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: Config = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }
}
