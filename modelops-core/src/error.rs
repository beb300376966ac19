//! Error types for the modelops core library.
//!
//! Uses `thiserror` for public API error types. Configuration problems are
//! split into loading failures (bad file, bad types) and validation failures
//! (values that parse but make no sense).

/// Top-level error type for the modelops core library.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),
}

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("environment variable {var} has invalid value '{value}': {reason}")]
    BadEnv {
        var: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_message_names_field() {
        let err = ConfigError::invalid("tracking.uri", "missing host");
        assert_eq!(
            err.to_string(),
            "invalid value for tracking.uri: missing host"
        );
    }

    #[test]
    fn test_core_error_wraps_config() {
        let err: CoreError = ConfigError::invalid("registry.model_name", "empty").into();
        assert!(err.to_string().starts_with("Configuration error:"));
    }
}
