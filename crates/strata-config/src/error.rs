//! Errors raised while loading or validating configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Why a configuration could not be produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The named file does not exist.
    #[error("no configuration file at {}", path.display())]
    Missing {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        /// The file.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The source is neither TOML nor JSON.
    #[error("unsupported configuration format `{0}` (expected toml or json)")]
    UnsupportedFormat(String),

    /// TOML syntax or schema mismatch, including unknown fields.
    #[error("malformed TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax or schema mismatch, including unknown fields.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// An environment override does not parse for its field.
    #[error("{var}: {reason}")]
    Env {
        /// Variable name.
        var: String,
        /// Parse failure.
        reason: String,
    },

    /// A value parsed but breaks a constraint.
    #[error("`{field}` is invalid: {reason}")]
    InvalidValue {
        /// Dotted path of the field, e.g. `rate_limits./api.in_seconds`.
        field: String,
        /// The violated constraint.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn missing(path: impl Into<PathBuf>) -> Self {
        Self::Missing { path: path.into() }
    }

    pub(crate) fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn env(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// Reports a value that violates a constraint.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_names_the_path() {
        let err = ConfigError::missing("/etc/strata/strata.toml");
        assert_eq!(err.to_string(), "no configuration file at /etc/strata/strata.toml");
    }

    #[test]
    fn test_invalid_value_names_the_field() {
        let err =
            ConfigError::invalid_value("rate_limits./api.max_requests", "below safe_requests");
        assert_eq!(
            err.to_string(),
            "`rate_limits./api.max_requests` is invalid: below safe_requests"
        );
    }

    #[test]
    fn test_env_names_the_variable() {
        let err = ConfigError::env("STRATA__SERVER__REQUEST_TIMEOUT_SECS", "expected an integer");
        assert_eq!(
            err.to_string(),
            "STRATA__SERVER__REQUEST_TIMEOUT_SECS: expected an integer"
        );
    }
}
