//! Serial driver for low-level hardware communication
//!
//! Provides async line-oriented serial I/O with a board.

use async_trait::async_trait;
use ledboard_core::{config::SerialConfig, LedBoardError, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, warn};

/// Trait for serial transport abstraction
///
/// This trait enables testing of `BoardApi` without real hardware
/// by allowing mock implementations.
#[async_trait]
pub trait SerialTransport: Send {
    /// Send a command line and wait for the response lines
    async fn transaction(&mut self, command: &str) -> Result<Vec<String>>;

    /// Write raw bytes (firmware payload) without framing
    async fn write_bytes(&mut self, data: &[u8]) -> Result<()>;

    /// Wait for a response without sending anything first
    async fn read_response(&mut self, budget: Duration) -> Result<Vec<String>>;

    /// Get the port path
    fn port_path(&self) -> Option<&str> {
        None
    }
}

/// Serial driver for hardware communication
pub struct SerialDriver {
    port: BufReader<SerialStream>,
    port_path: String,
    suffix: &'static str,
    timeout_duration: Duration,
    debug_uart: bool,
}

impl SerialDriver {
    /// Open a serial port
    ///
    /// # Arguments
    /// * `port_path` - Path to the serial device (e.g., "/dev/ttyACM0")
    /// * `config` - Baud rate, timeout and UART debug settings
    pub fn new(port_path: &str, config: &SerialConfig) -> Result<Self> {
        debug!("Opening serial port: {}", port_path);

        let port = tokio_serial::new(port_path, config.baud_rate)
            .timeout(Duration::from_millis(config.timeout_ms))
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                error!("Failed to open serial port {}: {}", port_path, e);
                LedBoardError::Serial(format!("Failed to open serial port {}: {}", port_path, e))
            })?;

        debug!("Serial port opened successfully");

        Ok(Self {
            port: BufReader::new(port),
            port_path: port_path.to_string(),
            suffix: "\r\n",
            timeout_duration: Duration::from_millis(config.timeout_ms),
            debug_uart: config.debug_uart,
        })
    }

    async fn write_all_timed(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.port.get_mut();

        timeout(self.timeout_duration, stream.write_all(data))
            .await
            .map_err(|_| {
                error!("Write timeout");
                LedBoardError::Timeout("Write operation timed out".to_string())
            })?
            .map_err(|e| {
                error!("Write failed: {}", e);
                LedBoardError::Serial(format!("Write failed: {}", e))
            })?;

        timeout(self.timeout_duration, stream.flush())
            .await
            .map_err(|_| LedBoardError::Timeout("Flush operation timed out".to_string()))?
            .map_err(|e| LedBoardError::Serial(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    /// Send a framed command line
    async fn send(&mut self, command: &str) -> Result<()> {
        let line = format!("{}{}", command, self.suffix);

        if self.debug_uart {
            debug!("TX: {:?}", line);
        }

        self.write_all_timed(line.as_bytes()).await
    }

    /// Read lines until one starts with '<'
    async fn read_until_response(&mut self, budget: Duration) -> Result<Vec<String>> {
        let debug_uart = self.debug_uart;
        let reader = &mut self.port;

        let result = timeout(budget, async {
            let mut lines = Vec::new();
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        warn!("Serial port returned EOF - board may have been unplugged");
                        return Err(LedBoardError::DeviceCommunication(
                            "Serial port returned EOF - board may have been unplugged".to_string(),
                        ));
                    }
                    Ok(_) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        if debug_uart {
                            debug!("RX: {:?}", line);
                        }
                        let done = line.starts_with('<');
                        lines.push(line);
                        if done {
                            return Ok(lines);
                        }
                    }
                    Err(e) => {
                        error!("Read error: {}", e);
                        return Err(LedBoardError::Serial(format!("Read error: {}", e)));
                    }
                }
            }
        })
        .await;

        match result {
            Ok(lines) => lines,
            Err(_) => {
                error!("Read timeout");
                Err(LedBoardError::Timeout("Read operation timed out".to_string()))
            }
        }
    }

    /// Drop stale input, both buffered and pending in the OS
    fn clear_input_buffer(&mut self) -> Result<()> {
        let buffered = self.port.buffer().len();
        self.port.consume(buffered);

        self.port
            .get_ref()
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(|e| {
                warn!("Failed to clear input buffer: {}", e);
                LedBoardError::Serial(format!("Failed to clear buffer: {}", e))
            })
    }
}

#[async_trait]
impl SerialTransport for SerialDriver {
    async fn transaction(&mut self, command: &str) -> Result<Vec<String>> {
        self.clear_input_buffer()?;
        self.send(command).await?;
        self.read_until_response(self.timeout_duration).await
    }

    async fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if self.debug_uart {
            debug!("TX: {} raw bytes", data.len());
        }
        self.write_all_timed(data).await
    }

    async fn read_response(&mut self, budget: Duration) -> Result<Vec<String>> {
        self.read_until_response(budget).await
    }

    fn port_path(&self) -> Option<&str> {
        Some(&self.port_path)
    }
}
