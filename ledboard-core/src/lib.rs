//! LED Board Core Library
//!
//! Shared types, models, and configuration for the LED board tools.
//! Used by the hardware crate and the board communication daemon.

pub mod board;
pub mod config;
pub mod error;
pub mod parameters;

// Re-export commonly used types
pub use board::*;
pub use config::{default_config_path, default_data_dir, Settings, StaticConfig};
pub use error::*;
pub use parameters::{ColorMode, ControlParameters, ParameterRange, PARAMETER_RANGES};
