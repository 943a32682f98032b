//! Configuration management.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use inkcast_epd::{BusConfig, DriverConfig, FitMode, SpiMode};
use inkcast_source::SourceConfig;
use serde::{Deserialize, Serialize};

/// Configuration file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config/inkcast.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Panel and bus configuration
    #[serde(default)]
    pub display: DisplayConfig,

    /// GPIO line numbers
    #[serde(default)]
    pub pins: PinConfig,

    /// Image source configuration
    #[serde(default)]
    pub source: SourceConfig,
}

/// Panel and bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// spidev device node
    #[serde(default = "default_spi_device")]
    pub spi_device: String,

    /// SPI clock in Hz
    #[serde(default = "default_clock_hz")]
    pub clock_hz: u32,

    /// Busy line poll interval in milliseconds
    #[serde(default = "default_busy_poll_ms")]
    pub busy_poll_ms: u64,

    /// Busy wait limit in milliseconds (0 waits forever)
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// How images are fitted: "cover" or "contain"
    #[serde(default = "default_fit")]
    pub fit: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            spi_device: default_spi_device(),
            clock_hz: default_clock_hz(),
            busy_poll_ms: default_busy_poll_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            fit: default_fit(),
        }
    }
}

/// GPIO line numbers (BCM numbering).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinConfig {
    #[serde(default = "default_reset_pin")]
    pub reset: u64,

    #[serde(default = "default_data_command_pin")]
    pub data_command: u64,

    #[serde(default = "default_busy_pin")]
    pub busy: u64,

    #[serde(default = "default_power_pin")]
    pub power: u64,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            reset: default_reset_pin(),
            data_command: default_data_command_pin(),
            busy: default_busy_pin(),
            power: default_power_pin(),
        }
    }
}

// Default value functions
fn default_spi_device() -> String {
    "/dev/spidev0.0".to_string()
}

fn default_clock_hz() -> u32 {
    4_000_000
}

fn default_busy_poll_ms() -> u64 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    60_000
}

fn default_fit() -> String {
    "cover".to_string()
}

fn default_reset_pin() -> u64 {
    17
}

fn default_data_command_pin() -> u64 {
    25
}

fn default_busy_pin() -> u64 {
    24
}

fn default_power_pin() -> u64 {
    18
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Loads an explicitly given file, or the default file when it exists.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path)
                .with_context(|| format!("Failed to load {}", path.display())),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    /// Driver settings derived from the display section.
    pub fn driver(&self) -> DriverConfig {
        let timeout = self.display.busy_timeout_ms;
        DriverConfig {
            bus: BusConfig {
                clock_hz: self.display.clock_hz,
                mode: SpiMode::Mode0,
            },
            busy_poll: Duration::from_millis(self.display.busy_poll_ms),
            busy_timeout: (timeout > 0).then(|| Duration::from_millis(timeout)),
        }
    }

    pub fn fit_mode(&self) -> Result<FitMode> {
        self.display
            .fit
            .parse()
            .map_err(anyhow::Error::msg)
            .context("Invalid display.fit")
    }
}
