//! Configuration schema types.
//!
//! This module defines the structure of every configuration section.

use serde::{Deserialize, Serialize};

/// Server configuration section.
///
/// # Example
///
/// ```
/// use strata_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "127.0.0.1:8080".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.request_timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Per-request timeout in seconds. Includes rate-limit delays.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (e.g. `info` or `strata=debug,hyper=warn`).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            include_location: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Reverse-proxy settings used when deriving caller identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Header carrying the client address, trusted when no session exists.
    #[serde(default = "default_trusted_header")]
    pub trusted_header: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            trusted_header: default_trusted_header(),
        }
    }
}

fn default_trusted_header() -> String {
    "x-forwarded-for".to_string()
}

/// Rate ceilings for one protected scope.
///
/// Within a window of `in_seconds`, the first `safe_requests` calls pass
/// immediately, calls up to `max_requests` pass after `wait_seconds`, and
/// later calls are rejected until the window ends.
///
/// Field names also accept the camel-case spelling (`safeRequests`, ...).
///
/// # Example
///
/// ```
/// use strata_config::RateLimitConfig;
///
/// let config = RateLimitConfig::new(10, 30, 60, 2);
/// assert!(config.validate("api").is_ok());
/// assert!(RateLimitConfig::new(30, 10, 60, 2).validate("api").is_err());
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Calls per window served without delay.
    #[serde(alias = "safeRequests")]
    pub safe_requests: u32,

    /// Hard ceiling per window.
    #[serde(alias = "maxRequests")]
    pub max_requests: u32,

    /// Window length in seconds.
    #[serde(alias = "inSeconds")]
    pub in_seconds: u64,

    /// Delay applied past the soft threshold, in seconds.
    #[serde(alias = "waitSeconds")]
    pub wait_seconds: u64,
}

impl RateLimitConfig {
    /// Creates a configuration.
    #[must_use]
    pub const fn new(
        safe_requests: u32,
        max_requests: u32,
        in_seconds: u64,
        wait_seconds: u64,
    ) -> Self {
        Self {
            safe_requests,
            max_requests,
            in_seconds,
            wait_seconds,
        }
    }

    /// Checks internal consistency. `scope` names the entry in errors.
    pub fn validate(&self, scope: &str) -> Result<(), crate::ConfigError> {
        if self.in_seconds == 0 {
            return Err(crate::ConfigError::invalid_value(
                format!("rate_limits.{scope}.in_seconds"),
                "window must be at least one second",
            ));
        }
        if self.max_requests < self.safe_requests {
            return Err(crate::ConfigError::invalid_value(
                format!("rate_limits.{scope}.max_requests"),
                format!(
                    "{} is below safe_requests ({})",
                    self.max_requests, self.safe_requests
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, "0.0.0.0:8080");
        assert_eq!(config.shutdown_timeout_secs, 30);
    }

    #[test]
    fn test_log_format_serde() {
        let format: LogFormat = serde_json::from_str(r#""pretty""#).unwrap();
        assert_eq!(format, LogFormat::Pretty);
    }

    #[test]
    fn test_rate_limit_camel_case_aliases() {
        let config: RateLimitConfig = serde_json::from_str(
            r#"{"safeRequests":10,"maxRequests":30,"inSeconds":60,"waitSeconds":2}"#,
        )
        .unwrap();
        assert_eq!(config, RateLimitConfig::new(10, 30, 60, 2));
    }

    #[test]
    fn test_rate_limit_zero_window_rejected() {
        let err = RateLimitConfig::new(1, 1, 0, 0).validate("/api").unwrap_err();
        assert!(err.to_string().contains("rate_limits./api.in_seconds"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<ServerConfig, _> = toml::from_str("port = 80");
        assert!(result.is_err());
    }
}
