//! Board sessions
//!
//! A session is an open line of communication with one board, identified by
//! its serial port name. Every operation may fail with a device
//! communication error; callers decide what to do with it.

use async_trait::async_trait;
use ledboard_core::{
    config::SerialConfig, ControlParameters, HardwareConfiguration, HardwareInfo, Result,
};
use std::path::Path;

use crate::board_api::BoardApi;
use crate::serial_driver::SerialDriver;

/// Operations available on an open board session
#[async_trait]
pub trait BoardSession: Send {
    async fn get_hardware_info(&mut self) -> Result<HardwareInfo>;

    async fn get_configuration(&mut self) -> Result<HardwareConfiguration>;

    async fn get_control_parameters(&mut self) -> Result<ControlParameters>;

    async fn set_control_parameters(&mut self, parameters: &ControlParameters) -> Result<()>;

    /// Persist the live control parameters to the board's flash
    async fn save_control_parameters(&mut self) -> Result<()>;

    async fn reboot(&mut self) -> Result<()>;

    /// Send a firmware image; the board reboots once it is written
    async fn upload_firmware(&mut self, image_path: &Path) -> Result<()>;
}

/// Opens sessions by port name
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, port: &str) -> Result<Box<dyn BoardSession>>;
}

/// Opens [`BoardApi`] sessions over real serial ports
#[derive(Debug, Clone, Default)]
pub struct SerialSessionFactory {
    config: SerialConfig,
}

impl SerialSessionFactory {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for SerialSessionFactory {
    async fn open(&self, port: &str) -> Result<Box<dyn BoardSession>> {
        let driver = SerialDriver::new(port, &self.config)?;
        Ok(Box::new(BoardApi::new(driver)))
    }
}
