//! Board API - High-level interface to one board
//!
//! Implements the board's line protocol over a serial transport.
//!
//! Requests are `>` followed by a four-letter mnemonic and an optional
//! `|`-separated payload. The board may print log lines first; the answer
//! is the first line starting with `<`:
//!
//! - `<OK` or `<OK|<json>` on success
//! - `<ERR|<reason>` when the board refused the command

use async_trait::async_trait;
use ledboard_core::{
    ControlParameters, HardwareConfiguration, HardwareInfo, LedBoardError, Result,
};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::serial_driver::{SerialDriver, SerialTransport};
use crate::session::BoardSession;

/// Firmware bytes written per chunk
const FLASH_CHUNK_SIZE: usize = 4096;

/// Time the board may take to write a received image to flash
const FLASH_COMMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Commands supported by the board firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetHardwareInfo,
    GetConfiguration,
    GetControlParameters,
    SetControlParameters,
    SaveControlParameters,
    Reboot,
    UploadFirmware,
}

impl Command {
    /// Wire mnemonic
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Command::GetHardwareInfo => "INFO",
            Command::GetConfiguration => "CONF",
            Command::GetControlParameters => "PGET",
            Command::SetControlParameters => "PSET",
            Command::SaveControlParameters => "PSAV",
            Command::Reboot => "BOOT",
            Command::UploadFirmware => "FLSH",
        }
    }
}

/// Board API
///
/// Generic over the transport type, allowing real hardware (`SerialDriver`)
/// or mock transports for testing.
pub struct BoardApi<T: SerialTransport + ?Sized = dyn SerialTransport> {
    transport: Box<T>,
}

impl BoardApi<SerialDriver> {
    /// Create a new BoardApi over an open serial driver
    pub fn new(driver: SerialDriver) -> Self {
        Self {
            transport: Box::new(driver),
        }
    }
}

impl<T: SerialTransport + ?Sized> BoardApi<T> {
    /// Create a new BoardApi with a boxed transport
    ///
    /// This is primarily useful for testing with mock transports.
    pub fn with_transport(transport: Box<T>) -> Self {
        Self { transport }
    }

    /// Send a command and return the answer payload, if any
    async fn send_command(&mut self, cmd: Command, payload: Option<&str>) -> Result<Option<String>> {
        let line = match payload {
            Some(payload) => format!(">{}|{}", cmd.mnemonic(), payload),
            None => format!(">{}", cmd.mnemonic()),
        };

        debug!("Sending command: {:?}", cmd);

        let response = self.transport.transaction(&line).await?;
        parse_response(cmd, response)
    }

    /// Send a command whose answer carries a JSON document
    async fn query<R: DeserializeOwned>(&mut self, cmd: Command) -> Result<R> {
        let payload = self.send_command(cmd, None).await?.ok_or_else(|| {
            LedBoardError::DeviceCommunication(format!("{} answered without data", cmd.mnemonic()))
        })?;

        serde_json::from_str(&payload).map_err(|e| {
            LedBoardError::Parse(format!("Invalid {} answer: {}", cmd.mnemonic(), e))
        })
    }

    /// Send a command whose answer is a bare acknowledgement
    async fn execute(&mut self, cmd: Command, payload: Option<&str>) -> Result<()> {
        self.send_command(cmd, payload).await.map(|_| ())
    }
}

/// Extract the answer line from the response
fn parse_response(cmd: Command, response: Vec<String>) -> Result<Option<String>> {
    for line in &response {
        let Some(answer) = line.strip_prefix('<') else {
            debug!("Board log: {}", line);
            continue;
        };

        let (status, data) = match answer.split_once('|') {
            Some((status, data)) => (status, Some(data)),
            None => (answer, None),
        };

        return match status {
            "OK" => Ok(data.map(str::to_string)),
            "ERR" => Err(LedBoardError::DeviceCommunication(format!(
                "{} refused: {}",
                cmd.mnemonic(),
                data.unwrap_or("no reason given")
            ))),
            other => Err(LedBoardError::DeviceCommunication(format!(
                "Unexpected answer to {}: {}",
                cmd.mnemonic(),
                other
            ))),
        };
    }

    error!("No valid response found in: {:?}", response);
    Err(LedBoardError::DeviceCommunication(
        "No valid response received".to_string(),
    ))
}

#[async_trait]
impl<T: SerialTransport + ?Sized> BoardSession for BoardApi<T> {
    async fn get_hardware_info(&mut self) -> Result<HardwareInfo> {
        self.query(Command::GetHardwareInfo).await
    }

    async fn get_configuration(&mut self) -> Result<HardwareConfiguration> {
        self.query(Command::GetConfiguration).await
    }

    async fn get_control_parameters(&mut self) -> Result<ControlParameters> {
        self.query(Command::GetControlParameters).await
    }

    async fn set_control_parameters(&mut self, parameters: &ControlParameters) -> Result<()> {
        let payload = serde_json::to_string(parameters)?;
        self.execute(Command::SetControlParameters, Some(&payload))
            .await
    }

    async fn save_control_parameters(&mut self) -> Result<()> {
        self.execute(Command::SaveControlParameters, None).await
    }

    async fn reboot(&mut self) -> Result<()> {
        self.execute(Command::Reboot, None).await
    }

    async fn upload_firmware(&mut self, image_path: &Path) -> Result<()> {
        let image = tokio::fs::read(image_path).await?;
        info!(
            "Uploading firmware {} ({} bytes)",
            image_path.display(),
            image.len()
        );

        // The board acknowledges the size before accepting raw bytes
        self.execute(Command::UploadFirmware, Some(&image.len().to_string()))
            .await?;

        for chunk in image.chunks(FLASH_CHUNK_SIZE) {
            self.transport.write_bytes(chunk).await?;
        }

        let response = self.transport.read_response(FLASH_COMMIT_TIMEOUT).await?;
        parse_response(Command::UploadFirmware, response)?;

        info!("Firmware upload complete");
        Ok(())
    }
}
