//! Error types for livecap.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LivecapError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    DeviceUnavailable { device: String },

    #[error("Audio format unsupported on {device}: {message}")]
    FormatUnsupported { device: String, message: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Speech engine errors
    #[error("Speech model not found at {path}")]
    ModelNotFound { path: String },

    #[error("Transcription failed: {message}")]
    Engine { message: String },

    // Translation service errors
    #[error("Translation failed: {message}")]
    Translation { message: String },

    #[error("Translation service not configured: {message}")]
    TranslationUnconfigured { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, LivecapError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_device_unavailable_display() {
        let error = LivecapError::DeviceUnavailable {
            device: "hw:1,0".to_string(),
        };
        assert_eq!(error.to_string(), "Audio device not found: hw:1,0");
    }

    #[test]
    fn test_format_unsupported_display() {
        let error = LivecapError::FormatUnsupported {
            device: "loopback".to_string(),
            message: "no 16kHz mono config".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Audio format unsupported on loopback: no 16kHz mono config"
        );
    }

    #[test]
    fn test_engine_display() {
        let error = LivecapError::Engine {
            message: "inference timed out".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Transcription failed: inference timed out"
        );
    }

    #[test]
    fn test_translation_display() {
        let error = LivecapError::Translation {
            message: "rate limited".to_string(),
        };
        assert_eq!(error.to_string(), "Translation failed: rate limited");
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = LivecapError::ConfigInvalidValue {
            key: "silence_threshold".to_string(),
            message: "must be non-negative".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for silence_threshold: must be non-negative"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: LivecapError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("a = b = c").unwrap_err();
        let error: LivecapError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<LivecapError>();
        assert_sync::<LivecapError>();
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(7)
        }
        assert_eq!(returns_result().unwrap(), 7);
    }
}
