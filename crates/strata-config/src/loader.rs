//! Layered configuration loading: defaults, a file, `.env`, then the
//! process environment.

use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, LogFormat, RateLimitConfig, StrataConfig};

/// Builds a [`StrataConfig`] from layers; later layers win:
/// 1. Default values
/// 2. Configuration file (TOML or JSON)
/// 3. `.env` file, loaded into the process environment
/// 4. Environment variables (`PREFIX__SECTION__KEY`)
///
/// # Example
///
/// ```no_run
/// use strata_config::ConfigLoader;
///
/// # fn main() -> Result<(), strata_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("strata.toml")?
///     .with_dotenv()
///     .with_env_prefix("STRATA")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: StrataConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: StrataConfig::default(),
            env_prefix: None,
        }
    }

    /// Start from the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = StrataConfig::development();
        self
    }

    /// Start from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = StrataConfig::production();
        self
    }

    /// Replaces the current layer with the contents of `path`.
    ///
    /// The format is chosen by extension (`.toml` or `.json`). Sections
    /// missing from the file take their default values.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::missing(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::unreadable(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `format` ("toml" or "json").
    ///
    /// # Example
    ///
    /// ```
    /// use strata_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [rate_limits."/api"]
    ///     safe_requests = 10
    ///     max_requests = 30
    ///     in_seconds = 60
    ///     wait_seconds = 2
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.rate_limits["/api"].safe_requests, 10);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::UnsupportedFormat(format.to_string()))
            }
        };
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// With prefix `STRATA`:
    /// - `STRATA__SERVER__HTTP_ADDR=0.0.0.0:9000`
    /// - `STRATA__LOGGING__FORMAT=pretty`
    /// - `STRATA__RATE_LIMITS__API__MAX_REQUESTS=50`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if one exists.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        let _ = dotenvy::dotenv();
        self
    }

    /// Apply environment overrides and validate.
    pub fn load(mut self) -> Result<StrataConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> StrataConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<StrataConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let mut vars: Vec<(String, String)> =
            env::vars().filter(|(k, _)| k.starts_with(prefix)).collect();
        vars.sort();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            return Ok(());
        };

        let parts: Vec<&str> = rest.split("__").collect();

        match parts.as_slice() {
            ["SERVER", "HTTP_ADDR"] => {
                self.config.server.http_addr = value.to_string();
            }
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                self.config.server.shutdown_timeout_secs = parse_int(key, value)?;
            }
            ["SERVER", "REQUEST_TIMEOUT_SECS"] => {
                self.config.server.request_timeout_secs = parse_int(key, value)?;
            }

            ["LOGGING", "ENABLED"] => {
                self.config.logging.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env(key, "expected boolean"))?;
            }
            ["LOGGING", "LEVEL"] => {
                self.config.logging.level = value.to_string();
            }
            ["LOGGING", "FORMAT"] => {
                self.config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }

            ["PROXY", "TRUSTED_HEADER"] => {
                self.config.proxy.trusted_header = value.to_lowercase();
            }

            ["RATE_LIMITS", scope, field] => {
                let scope = self.rate_limit_scope(scope);
                let limits = self
                    .config
                    .rate_limits
                    .entry(scope)
                    .or_insert(RateLimitConfig::new(0, 0, 0, 0));
                match *field {
                    "SAFE_REQUESTS" => limits.safe_requests = parse_int(key, value)?,
                    "MAX_REQUESTS" => limits.max_requests = parse_int(key, value)?,
                    "IN_SECONDS" => limits.in_seconds = parse_int(key, value)?,
                    "WAIT_SECONDS" => limits.wait_seconds = parse_int(key, value)?,
                    _ => return Err(ConfigError::env(key, "unknown rate limit field")),
                }
            }

            _ => {}
        }

        Ok(())
    }

    /// Maps an environment scope segment to an existing scope key, matching
    /// case-insensitively with non-alphanumerics folded to `_`. Unknown
    /// segments become a new lowercase key.
    fn rate_limit_scope(&self, segment: &str) -> String {
        self.config
            .rate_limits
            .keys()
            .find(|existing| env_segment(existing) == segment)
            .cloned()
            .unwrap_or_else(|| segment.to_lowercase())
    }
}

fn env_segment(scope: &str) -> String {
    scope
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::env(key, "expected integer"))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"proxy": {"trusted_header": "x-real-ip"}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.proxy.trusted_header, "x-real-ip");
    }

    #[test]
    fn test_loader_rejects_unknown_format() {
        assert!(ConfigLoader::new().with_string("", "yaml").is_err());
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/strata.toml");
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/strata.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    // Process environment is shared between tests, so overrides are applied
    // through `apply_env_var` directly.

    #[test]
    fn test_apply_env_var_server() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__SERVER__HTTP_ADDR", "127.0.0.1:9000", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__SERVER__REQUEST_TIMEOUT_SECS", "5", "TEST")
            .unwrap();
        assert_eq!(loader.config.server.http_addr, "127.0.0.1:9000");
        assert_eq!(loader.config.server.request_timeout_secs, 5);
    }

    #[test]
    fn test_apply_env_var_invalid_integer() {
        let mut loader = ConfigLoader::new();
        let result =
            loader.apply_env_var("TEST__SERVER__SHUTDOWN_TIMEOUT_SECS", "soon", "TEST");
        assert!(matches!(result, Err(ConfigError::Env { .. })));
    }

    #[test]
    fn test_apply_env_var_log_format() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__LOGGING__FORMAT", "pretty", "TEST")
            .unwrap();
        assert_eq!(loader.config.logging.format, LogFormat::Pretty);
        assert!(loader
            .apply_env_var("TEST__LOGGING__FORMAT", "xml", "TEST")
            .is_err());
    }

    #[test]
    fn test_apply_env_var_overrides_existing_scope() {
        let mut loader = ConfigLoader::new()
            .with_string(
                r#"
                [rate_limits."/api/users"]
                safe_requests = 10
                max_requests = 30
                in_seconds = 60
                wait_seconds = 2
                "#,
                "toml",
            )
            .unwrap();

        loader
            .apply_env_var("TEST__RATE_LIMITS__API_USERS__MAX_REQUESTS", "50", "TEST")
            .unwrap();

        assert_eq!(loader.config.rate_limits["/api/users"].max_requests, 50);
        assert_eq!(loader.config.rate_limits.len(), 1);
    }

    #[test]
    fn test_apply_env_var_new_scope() {
        let mut loader = ConfigLoader::new();
        for (field, value) in [
            ("SAFE_REQUESTS", "1"),
            ("MAX_REQUESTS", "2"),
            ("IN_SECONDS", "10"),
            ("WAIT_SECONDS", "1"),
        ] {
            loader
                .apply_env_var(&format!("TEST__RATE_LIMITS__LOGIN__{field}"), value, "TEST")
                .unwrap();
        }
        assert_eq!(
            loader.config.rate_limits["login"],
            RateLimitConfig::new(1, 2, 10, 1)
        );
        assert!(loader.config.validate().is_ok());
    }

    #[test]
    fn test_env_segment() {
        assert_eq!(env_segment("/api/users"), "API_USERS");
        assert_eq!(env_segment("login"), "LOGIN");
    }
}
