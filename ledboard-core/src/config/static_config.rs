//! Static configuration loaded once at startup
//!
//! This configuration is read-only after the communicator starts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::board::{UsbId, DEFAULT_BAUD_RATE};

const APP_DIR: &str = "ledboard";

/// `config.toml` under the user's config directory, or under `/etc` on
/// systems without one
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join(APP_DIR)
        .join("config.toml")
}

/// Where settings live unless `data_dir` says otherwise
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join(APP_DIR)
}

/// Discovery polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between two discovery ticks in milliseconds
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Read/write timeout in milliseconds
    pub timeout_ms: u64,
    /// Log every line sent and received
    #[serde(default)]
    pub debug_uart: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: 2000,
            debug_uart: false,
        }
    }
}

/// Board discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Probe each port by opening it to tell free boards from busy ones
    pub probe_availability: bool,
    /// USB identifiers accepted as boards
    pub usb_ids: Vec<UsbId>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_availability: true,
            usb_ids: vec![UsbId::default()],
        }
    }
}

/// Static configuration for the LED board tools.
///
/// Located at `~/.config/ledboard/config.toml` by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticConfig {
    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Directory for user settings
    ///
    /// Defaults to `~/.local/share/ledboard` (XDG data directory).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl StaticConfig {
    /// Create a new StaticConfig with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Parse StaticConfig from TOML string.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize StaticConfig to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
