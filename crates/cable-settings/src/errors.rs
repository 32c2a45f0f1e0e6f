//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading or parsing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the settings file.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A settings value was invalid (e.g., out of range).
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = SettingsError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not found",
        ));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: SettingsError = json_err.into();
        assert!(matches!(err, SettingsError::Json(_)));
        assert!(err.to_string().contains("parse settings JSON"));
    }

    #[test]
    fn invalid_value_display() {
        let err = SettingsError::InvalidValue("heartbeat interval must be positive".into());
        assert_eq!(
            err.to_string(),
            "invalid settings value: heartbeat interval must be positive"
        );
    }
}
