//! Error types for the LED board system

use thiserror::Error;

/// Core error type for LED board operations
#[derive(Error, Debug)]
pub enum LedBoardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serial port errors (open, enumerate, read, write)
    #[error("Serial port error: {0}")]
    Serial(String),

    /// The device answered with an error or an unusable response
    #[error("Device communication error: {0}")]
    DeviceCommunication(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Parsing errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid input or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No device at the requested port
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// A request was submitted while the communicator is stopped
    #[error("Board communicator is not running")]
    NotRunning,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for LED board operations
pub type Result<T> = std::result::Result<T, LedBoardError>;

impl From<serde_json::Error> for LedBoardError {
    fn from(err: serde_json::Error) -> Self {
        LedBoardError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: LedBoardError = json_err.into();

        match err {
            LedBoardError::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LedBoardError = io_err.into();

        match err {
            LedBoardError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = LedBoardError::DeviceCommunication("no answer".to_string());
        assert_eq!(format!("{}", err), "Device communication error: no answer");

        let err = LedBoardError::DeviceNotFound("/dev/ttyACM0".to_string());
        assert_eq!(format!("{}", err), "Device not found: /dev/ttyACM0");

        let err = LedBoardError::NotRunning;
        assert_eq!(format!("{}", err), "Board communicator is not running");
    }
}
