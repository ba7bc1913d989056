//! Configuration loading and validation for prompt-relay.
//!
//! Configuration is environment-sourced. Keys are matched case-insensitively
//! so `openai_api_key` and `OPENAI_API_KEY` are equivalent.

use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Default OpenAI model used when `OPENAI_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";
/// Default provider base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// Default front-end origins allowed by CORS.
pub const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:4200", "http://localhost:4201"];
/// Default capacity of the in-memory log buffer.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

const LOG_LEVELS: [&str; 6] = ["TRACE", "DEBUG", "INFO", "WARNING", "WARN", "ERROR"];

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
}

/// Upstream provider configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: ApiKey,
    pub model: String,
    /// Base URL for the provider's API (e.g., "https://api.openai.com/v1")
    pub base_url: String,
    /// Bound on non-streaming calls and on idle gaps between streamed chunks.
    pub timeout: Duration,
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Address to bind, e.g. "0.0.0.0:8000".
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level as configured (e.g. "INFO")
    pub level: String,
    /// Maximum number of entries kept by the in-memory log buffer
    pub buffer_capacity: usize,
}

impl LoggingConfig {
    /// The level translated into a `tracing` filter directive.
    pub fn filter_directive(&self) -> &'static str {
        match self.level.to_uppercase().as_str() {
            "TRACE" => "trace",
            "DEBUG" => "debug",
            "WARNING" | "WARN" => "warn",
            "ERROR" => "error",
            _ => "info",
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            buffer_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Cross-origin configuration: a static allow-list.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        }
    }
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
///
/// Only accessible via `.expose_secret()`, which keeps every use grep-auditable.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Required setting '{0}' is not set")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for '{key}': {message}")]
    Invalid {
        key: &'static str,
        value: String,
        message: String,
    },
}

impl Config {
    /// Build configuration from the process environment.
    ///
    /// Keys are compared case-insensitively against every variable in the
    /// environment, so a `.env` file written in lowercase still applies.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: Vec<(String, String)> = std::env::vars().collect();
        Self::from_lookup(|key| {
            vars.iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))
                .map(|(_, value)| value.clone())
        })
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// `lookup` is asked for upper-case key names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        let timeout_secs = parse_or("OPENAI_TIMEOUT_SECS", get("OPENAI_TIMEOUT_SECS"), 120u64)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "OPENAI_TIMEOUT_SECS",
                value: "0".to_string(),
                message: "timeout must be positive".to_string(),
            });
        }

        let openai = OpenAiConfig {
            api_key: ApiKey::from(api_key),
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(timeout_secs),
        };

        let defaults = ServerConfig::default();
        let server = ServerConfig {
            host: get("API_HOST").unwrap_or(defaults.host),
            port: parse_or("API_PORT", get("API_PORT"), defaults.port)?,
        };

        let level = get("LOG_LEVEL").unwrap_or_else(|| "INFO".to_string());
        if !LOG_LEVELS.contains(&level.to_uppercase().as_str()) {
            return Err(ConfigError::Invalid {
                key: "LOG_LEVEL",
                value: level,
                message: format!("expected one of {}", LOG_LEVELS.join(", ")),
            });
        }
        let logging = LoggingConfig {
            level,
            buffer_capacity: parse_or(
                "LOG_BUFFER_CAPACITY",
                get("LOG_BUFFER_CAPACITY"),
                DEFAULT_LOG_CAPACITY,
            )?,
        };

        let cors = match get("CORS_ORIGINS") {
            Some(raw) => CorsConfig {
                allowed_origins: raw
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect(),
            },
            None => CorsConfig::default(),
        };

        Ok(Config {
            openai,
            server,
            logging,
            cors,
        })
    }
}

/// Parse an optional raw value, falling back to `default` when absent.
fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => match value.parse() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::Invalid {
                key,
                message: e.to_string(),
                value,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")])).unwrap();

        assert_eq!(config.openai.model, DEFAULT_MODEL);
        assert_eq!(config.openai.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.openai.timeout, Duration::from_secs(120));
        assert_eq!(config.server.listen_addr(), "0.0.0.0:8000");
        assert_eq!(config.logging.level, "INFO");
        assert_eq!(config.logging.buffer_capacity, 1000);
        assert_eq!(
            config.cors.allowed_origins,
            vec!["http://localhost:4200", "http://localhost:4201"]
        );
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("OPENAI_BASE_URL", "http://localhost:9999/v1/"),
            ("OPENAI_TIMEOUT_SECS", "30"),
            ("API_HOST", "127.0.0.1"),
            ("API_PORT", "9000"),
            ("LOG_LEVEL", "debug"),
            ("LOG_BUFFER_CAPACITY", "50"),
            ("CORS_ORIGINS", "http://a.test, http://b.test,"),
        ]))
        .unwrap();

        assert_eq!(config.openai.model, "gpt-4o-mini");
        assert_eq!(config.openai.base_url, "http://localhost:9999/v1");
        assert_eq!(config.openai.timeout, Duration::from_secs(30));
        assert_eq!(config.server.listen_addr(), "127.0.0.1:9000");
        assert_eq!(config.logging.filter_directive(), "debug");
        assert_eq!(config.logging.buffer_capacity, 50);
        assert_eq!(config.cors.allowed_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn test_missing_api_key_fails() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_blank_api_key_counts_as_missing() {
        let err = Config::from_lookup(lookup_from(&[("OPENAI_API_KEY", "   ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("OPENAI_API_KEY")));
    }

    #[test]
    fn test_invalid_port_fails() {
        let err = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("API_PORT", "eighty"),
        ]))
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("API_PORT"), "Error should name the key: {}", msg);
        assert!(msg.contains("eighty"), "Error should echo the value: {}", msg);
    }

    #[test]
    fn test_unknown_log_level_fails() {
        let err = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("LOG_LEVEL", "LOUD"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("LOG_LEVEL"));
    }

    #[test]
    fn test_zero_timeout_fails() {
        let result = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_TIMEOUT_SECS", "0"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_warning_maps_to_warn_directive() {
        let logging = LoggingConfig {
            level: "Warning".to_string(),
            buffer_capacity: 10,
        };
        assert_eq!(logging.filter_directive(), "warn");
    }

    #[test]
    fn test_api_key_debug_redaction() {
        let key = ApiKey::from("sk-super-secret");
        let debug_output = format!("{:?}", key);
        assert_eq!(debug_output, "[REDACTED]");
        assert!(!debug_output.contains("super-secret"));
    }

    #[test]
    fn test_api_key_serialize_redaction() {
        let key = ApiKey::from("sk-real-secret");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"[REDACTED]\"");
    }

    #[test]
    fn test_config_debug_does_not_leak_key() {
        let config =
            Config::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-leak-check")])).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-leak-check"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(config.openai.api_key.expose_secret(), "sk-leak-check");
    }
}
