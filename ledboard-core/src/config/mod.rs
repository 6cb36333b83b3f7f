//! Configuration types for LED board tools
//!
//! # Architecture
//!
//! Configuration is split into:
//! - [`StaticConfig`] - polling, serial and discovery settings, loaded once at startup
//! - [`Settings`] - user settings remembered between runs (last firmware image)
//!
//! Settings are stored as JSON within the data directory.

mod settings;
mod static_config;

pub use settings::{Settings, SETTINGS_FILE_NAME};
pub use static_config::{
    default_config_path, default_data_dir, DiscoveryConfig, PollingConfig, SerialConfig,
    StaticConfig,
};
