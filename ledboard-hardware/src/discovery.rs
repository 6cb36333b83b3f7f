//! Board discovery
//!
//! Enumerates serial ports, keeps the ones whose USB identifiers belong to a
//! known board, and tells free boards from boards another process holds.

use async_trait::async_trait;
use ledboard_core::{config::DiscoveryConfig, LedBoardError, ListedBoard, Result, UsbId};
use std::time::Duration;
use tracing::{debug, error};

/// Time allowed for an availability probe to open a port
const PROBE_TIMEOUT: Duration = Duration::from_millis(50);

/// Source of the currently attached boards
///
/// An empty list is a normal answer; errors are reserved for enumeration
/// itself failing.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn list_boards(&self) -> Result<Vec<ListedBoard>>;
}

/// Discovers boards among the system's serial ports
#[derive(Debug, Clone)]
pub struct SerialDiscovery {
    config: DiscoveryConfig,
    baud_rate: u32,
}

impl SerialDiscovery {
    pub fn new(config: DiscoveryConfig, baud_rate: u32) -> Self {
        Self { config, baud_rate }
    }

    fn matches(&self, vid: u16, pid: u16) -> bool {
        self.config.usb_ids.contains(&UsbId { vid, pid })
    }

    /// Enumerate ports; blocking, run off the async executor
    fn enumerate(&self) -> Result<Vec<ListedBoard>> {
        let ports = tokio_serial::available_ports().map_err(|e| {
            error!("Failed to enumerate serial ports: {}", e);
            LedBoardError::Serial(format!("Failed to enumerate ports: {}", e))
        })?;

        let mut boards = Vec::new();
        for port in ports {
            let tokio_serial::SerialPortType::UsbPort(info) = &port.port_type else {
                continue;
            };

            if !self.matches(info.vid, info.pid) {
                continue;
            }

            let available = !self.config.probe_availability || self.probe(&port.port_name);
            debug!(
                "Found board at {} (VID:{:04X} PID:{:04X}, available: {})",
                port.port_name, info.vid, info.pid, available
            );

            let mut board = ListedBoard::new(port.port_name.clone(), available);
            if let Some(summary) = summarize(info.product.as_deref(), info.serial_number.as_deref())
            {
                board = board.with_summary(summary);
            }
            boards.push(board);
        }

        boards.sort_by(|a, b| a.port.cmp(&b.port));
        Ok(boards)
    }

    /// A port that cannot be opened is held by someone else
    fn probe(&self, port_name: &str) -> bool {
        match tokio_serial::new(port_name, self.baud_rate)
            .timeout(PROBE_TIMEOUT)
            .open()
        {
            Ok(_) => true,
            Err(e) => {
                debug!("Port {} is busy: {}", port_name, e);
                false
            }
        }
    }
}

/// One-line description from the USB descriptor strings
fn summarize(product: Option<&str>, serial_number: Option<&str>) -> Option<String> {
    match (product, serial_number) {
        (Some(product), Some(serial)) => Some(format!("{} #{}", product, serial)),
        (Some(product), None) => Some(product.to_string()),
        (None, Some(serial)) => Some(format!("#{}", serial)),
        (None, None) => None,
    }
}

#[async_trait]
impl DiscoverySource for SerialDiscovery {
    async fn list_boards(&self) -> Result<Vec<ListedBoard>> {
        let discovery = self.clone();
        tokio::task::spawn_blocking(move || discovery.enumerate())
            .await
            .map_err(|e| LedBoardError::Other(format!("Discovery task failed: {}", e)))?
    }
}
