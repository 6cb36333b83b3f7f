//! Board definitions
//!
//! Snapshot values describing attached boards and the static facts read
//! from them. Hardware I/O lives in the `ledboard-hardware` crate; this
//! module only holds plain data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// USB Vendor ID of the stock board (Raspberry Pi Foundation)
pub const DEFAULT_USB_VID: u16 = 0x2E8A;

/// USB Product ID of the stock board firmware
pub const DEFAULT_USB_PID: u16 = 0x000A;

/// Serial baud rate used by the board firmware
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// USB vendor and product IDs used to recognise boards during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

impl Default for UsbId {
    fn default() -> Self {
        Self {
            vid: DEFAULT_USB_VID,
            pid: DEFAULT_USB_PID,
        }
    }
}

impl fmt::Display for UsbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.vid, self.pid)
    }
}

/// A board as seen by one discovery tick.
///
/// Identity is the serial port name. Instances are replaced, never
/// mutated, by later ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedBoard {
    /// Serial port name, stable while the board stays attached
    pub port: String,
    /// `false` when another process holds the port
    pub available: bool,
    /// Cached one-line description (USB product, serial number)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ListedBoard {
    /// Create a board entry without a summary
    pub fn new(port: impl Into<String>, available: bool) -> Self {
        Self {
            port: port.into(),
            available,
            summary: None,
        }
    }

    /// Attach a cached summary
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Human-readable availability
    pub fn availability(&self) -> &'static str {
        if self.available {
            "free"
        } else {
            "busy"
        }
    }
}

impl fmt::Display for ListedBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.port, self.availability())?;
        if let Some(summary) = &self.summary {
            write!(f, " - {}", summary)?;
        }
        Ok(())
    }
}

/// Static identity and capability facts read from a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareInfo {
    /// Board name as reported by the firmware
    pub name: String,
    /// Firmware revision number
    pub firmware_revision: u32,
    /// PCB revision number
    pub hardware_revision: u32,
    /// Unique chip identifier (hex string)
    pub unique_id: String,
    /// Number of LEDs driven by the board
    pub led_count: u16,
}

/// Persisted device configuration, read and written as key/value pairs.
///
/// Keys are kept ordered so printed configurations are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HardwareConfiguration(pub BTreeMap<String, serde_json::Value>);

impl HardwareConfiguration {
    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Set a value
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    /// Iterate over entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
