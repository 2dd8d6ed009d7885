//! Main configuration types.
//!
//! This module provides the top-level [`StrataConfig`] struct and its builder.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, LogFormat, LoggingConfig, ProxyConfig, RateLimitConfig, ServerConfig};

/// Complete Strata configuration.
///
/// # Example
///
/// ```
/// use strata_config::StrataConfig;
///
/// let config = StrataConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert_eq!(config.proxy.trusted_header, "x-forwarded-for");
/// assert!(config.rate_limits.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct StrataConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Reverse-proxy configuration.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Rate ceilings keyed by scope (usually a mount prefix).
    #[serde(default)]
    pub rate_limits: BTreeMap<String, RateLimitConfig>,
}

impl StrataConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> StrataConfigBuilder {
        StrataConfigBuilder::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The server address does not parse
    /// - The trusted proxy header is empty
    /// - A rate-limit scope has a zero window or `max_requests < safe_requests`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "server.request_timeout_secs",
                "must be at least one second",
            ));
        }

        if self.proxy.trusted_header.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "proxy.trusted_header",
                "must not be empty",
            ));
        }

        for (scope, limits) in &self.rate_limits {
            limits.validate(scope)?;
        }

        Ok(())
    }

    /// Create a development configuration preset: pretty, debug-level logs.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.server.http_addr = "127.0.0.1:8080".to_string();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.logging.include_location = true;
        config
    }

    /// Create a production configuration preset: JSON, info-level logs.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config
    }
}

/// Builder for [`StrataConfig`].
#[derive(Debug, Default)]
pub struct StrataConfigBuilder {
    server: Option<ServerConfig>,
    logging: Option<LoggingConfig>,
    proxy: Option<ProxyConfig>,
    rate_limits: BTreeMap<String, RateLimitConfig>,
}

impl StrataConfigBuilder {
    /// Set the server configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Set the proxy configuration.
    #[must_use]
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Add rate ceilings for a scope.
    #[must_use]
    pub fn rate_limit(mut self, scope: impl Into<String>, limits: RateLimitConfig) -> Self {
        self.rate_limits.insert(scope.into(), limits);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> StrataConfig {
        StrataConfig {
            server: self.server.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
            proxy: self.proxy.unwrap_or_default(),
            rate_limits: self.rate_limits,
        }
    }

    /// Build and validate the configuration.
    pub fn build_validated(self) -> Result<StrataConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
