//! User settings remembered between runs
//!
//! Stored in `{data_dir}/settings.json`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File name of the settings file inside the data directory
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Settings persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Last firmware image used for an upload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_path: Option<PathBuf>,
}

impl Settings {
    /// Parse Settings from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Serialize Settings to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_settings() {
        let settings = Settings::from_json("{}").unwrap();
        assert!(settings.firmware_path.is_none());
        assert_eq!(settings.to_json().unwrap(), "{}");
    }

    #[test]
    fn test_firmware_path_kept() {
        let settings = Settings {
            firmware_path: Some(PathBuf::from("/home/me/ledboard.uf2")),
        };

        let json = settings.to_json().unwrap();
        assert!(json.contains("ledboard.uf2"));
        assert_eq!(Settings::from_json(&json).unwrap(), settings);
    }
}
