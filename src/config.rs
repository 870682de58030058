//! Configuration management for llm-proxy
//!
//! Settings come from an optional TOML file, then environment variables
//! override individual fields. Every section has defaults, so an empty
//! configuration yields a working stub-only gateway.

use crate::error::{AppError, AppResult};
use crate::providers::openai_compat::{DEFAULT_BASE_URL, OpenAiCompatConfig};
use crate::providers::registry::{FALLBACK_PROVIDER, ModelProviderMap};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request body limit in bytes; 0 disables the limit
    #[serde(default)]
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_request_bytes: 0,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// OpenAI-compatible backend settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Non-streaming request timeout; fractional seconds allowed
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_seconds() -> f64 {
    600.0
}

/// Model-to-provider routing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RoutingConfig {
    /// `pattern=provider[,pattern=provider]*`; patterns may end in `*`
    #[serde(default)]
    pub model_provider_map: String,
    #[serde(default = "default_provider")]
    pub default_provider: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            model_provider_map: String::new(),
            default_provider: default_provider(),
        }
    }
}

fn default_provider() -> String {
    FALLBACK_PROVIDER.to_string()
}

/// Sliding-window rate limiting
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_seconds: default_window_seconds(),
            max_requests: default_max_requests(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

fn default_window_seconds() -> u64 {
    60
}

fn default_max_requests() -> usize {
    60
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

/// API-key gate in front of every route
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_keys: Vec<String>,
}

/// Cross-origin policy
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CorsConfig {
    /// `*` allows any origin
    #[serde(default = "default_allow_origins")]
    pub allow_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: default_allow_origins(),
        }
    }
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allow_origins.iter().any(|o| o == "*")
    }
}

fn default_allow_origins() -> Vec<String> {
    vec!["*".to_string()]
}

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Per-request access logging
    #[serde(default)]
    pub log_requests: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_requests: false,
        }
    }
}

/// Levels accepted for `observability.log_level`
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file and validate it
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = Self::read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Build the runtime configuration
    ///
    /// Reads `path` if given (defaults otherwise), applies overrides from the
    /// process environment, then validates the result.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// [`Config::load`] with an explicit environment lookup
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> AppResult<Self> {
        let path_display = path.display().to_string();

        let content =
            std::fs::read_to_string(path).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
            path: path_display,
            source,
        })
    }

    /// Apply environment overrides
    ///
    /// Blank values are treated as unset. Values that fail to parse are
    /// configuration errors.
    pub fn apply_env<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("HOST") {
            self.server.host = v.trim().to_string();
        }
        if let Some(v) = get("PORT") {
            self.server.port = parse_env("PORT", &v)?;
        }
        if let Some(v) = get("MAX_REQUEST_BYTES") {
            self.server.max_request_bytes = parse_env("MAX_REQUEST_BYTES", &v)?;
        }

        if let Some(v) = get("OPENAI_COMPAT_BASE_URL") {
            self.provider.base_url = v.trim().to_string();
        }
        if let Some(v) = get("OPENAI_COMPAT_API_KEY") {
            self.provider.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_COMPAT_TIMEOUT_SECONDS") {
            self.provider.timeout_seconds = parse_env("OPENAI_COMPAT_TIMEOUT_SECONDS", &v)?;
        }

        if let Some(v) = get("MODEL_PROVIDER_MAP") {
            self.routing.model_provider_map = v;
        }
        if let Some(v) = get("LLM_PROVIDER") {
            self.routing.default_provider = v;
        }

        if let Some(v) = get("RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = parse_bool("RATE_LIMIT_ENABLED", &v)?;
        }
        if let Some(v) = get("RATE_LIMIT_WINDOW_SECONDS") {
            self.rate_limit.window_seconds = parse_env("RATE_LIMIT_WINDOW_SECONDS", &v)?;
        }
        if let Some(v) = get("RATE_LIMIT_MAX_REQUESTS") {
            self.rate_limit.max_requests = parse_env("RATE_LIMIT_MAX_REQUESTS", &v)?;
        }
        if let Some(v) = get("RATE_LIMIT_SWEEP_INTERVAL_SECONDS") {
            self.rate_limit.sweep_interval_seconds =
                parse_env("RATE_LIMIT_SWEEP_INTERVAL_SECONDS", &v)?;
        }

        if let Some(v) = get("API_KEY_AUTH_ENABLED") {
            self.auth.enabled = parse_bool("API_KEY_AUTH_ENABLED", &v)?;
        }
        if let Some(v) = get("API_KEYS") {
            self.auth.api_keys = parse_list(&v);
        }

        if let Some(v) = get("CORS_ALLOW_ORIGINS") {
            self.cors.allow_origins = parse_list(&v);
        }

        if let Some(v) = get("LOG_LEVEL") {
            self.observability.log_level = v.trim().to_lowercase();
        }
        if let Some(v) = get("LOG_REQUESTS") {
            self.observability.log_requests = parse_bool("LOG_REQUESTS", &v)?;
        }

        Ok(())
    }

    /// Validate configuration after parsing
    pub fn validate(&self) -> AppResult<()> {
        let base_url = &self.provider.base_url;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "provider.base_url '{}' must start with 'http://' or 'https://'",
                base_url
            )));
        }

        let timeout = self.provider.timeout_seconds;
        if !timeout.is_finite()
            || timeout <= 0.0
            || Duration::try_from_secs_f64(timeout).is_err()
        {
            return Err(AppError::Config(format!(
                "provider.timeout_seconds must be a positive finite number, got {}",
                timeout
            )));
        }

        if self.rate_limit.enabled {
            if self.rate_limit.window_seconds == 0 {
                return Err(AppError::Config(
                    "rate_limit.window_seconds must be greater than 0 when rate limiting is enabled"
                        .to_string(),
                ));
            }
            if self.rate_limit.max_requests == 0 {
                return Err(AppError::Config(
                    "rate_limit.max_requests must be greater than 0 when rate limiting is enabled"
                        .to_string(),
                ));
            }
        }
        if self.rate_limit.sweep_interval_seconds == 0 {
            return Err(AppError::Config(
                "rate_limit.sweep_interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.auth.enabled && self.auth.api_keys.iter().all(|k| k.trim().is_empty()) {
            return Err(AppError::Config(
                "auth.enabled is true but auth.api_keys is empty; no request could pass"
                    .to_string(),
            ));
        }

        let level = &self.observability.log_level;
        if !LOG_LEVELS.iter().any(|known| known.eq_ignore_ascii_case(level.trim())) {
            return Err(AppError::Config(format!(
                "observability.log_level '{}' must be one of {}",
                level,
                LOG_LEVELS.join(", ")
            )));
        }

        for origin in &self.cors.allow_origins {
            if origin != "*" && axum::http::HeaderValue::from_str(origin).is_err() {
                return Err(AppError::Config(format!(
                    "cors.allow_origins entry '{}' is not a valid header value",
                    origin
                )));
            }
        }

        Ok(())
    }

    /// Settings for OpenAI-compatible provider instances
    pub fn backend(&self) -> OpenAiCompatConfig {
        OpenAiCompatConfig {
            base_url: self.provider.base_url.clone(),
            api_key: self.provider.api_key.clone(),
            timeout: Duration::try_from_secs_f64(self.provider.timeout_seconds)
                .unwrap_or(crate::providers::openai_compat::DEFAULT_TIMEOUT),
        }
    }

    /// Parsed routing table
    pub fn model_provider_map(&self) -> ModelProviderMap {
        ModelProviderMap::parse(&self.routing.model_provider_map)
    }
}

impl FromStr for Config {
    type Err = AppError;

    /// Parse TOML text and validate it (no environment overrides)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)
            .map_err(|e| AppError::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_env<T>(key: &str, value: &str) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        AppError::Config(format!("Invalid value '{}' for {}: {}", value, key, e))
    })
}

fn parse_bool(key: &str, value: &str) -> AppResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(AppError::Config(format!(
            "Invalid boolean '{}' for {}: expected 1/true/yes or 0/false/no",
            other, key
        ))),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const TEST_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 9000
max_request_bytes = 1048576

[provider]
base_url = "http://gpu-box:8000/v1/"
api_key = "sk-local"
timeout_seconds = 30

[routing]
model_provider_map = "gpt-4=openai,llama*=ollama"
default_provider = "vllm"

[rate_limit]
enabled = true
window_seconds = 10
max_requests = 5

[auth]
enabled = true
api_keys = ["k1", "k2"]

[cors]
allow_origins = ["https://app.example.com"]

[observability]
log_level = "debug"
log_requests = true
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_from_str_parses_successfully() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.max_request_bytes, 1_048_576);
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-local"));
        assert_eq!(config.provider.timeout_seconds, 30.0);
        assert_eq!(config.routing.default_provider, "vllm");
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.sweep_interval_seconds, 60);
        assert_eq!(config.auth.api_keys, vec!["k1", "k2"]);
        assert!(!config.cors.allows_any_origin());
        assert!(config.observability.log_requests);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").expect("empty config is valid");
        assert_eq!(config, Config::default());
        assert_eq!(config.provider.base_url, "http://localhost:11434/v1");
        assert_eq!(config.provider.timeout_seconds, 600.0);
        assert_eq!(config.routing.default_provider, "stub");
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.rate_limit.window_seconds, 60);
        assert_eq!(config.rate_limit.max_requests, 60);
        assert!(!config.auth.enabled);
        assert!(config.cors.allows_any_origin());
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.server.max_request_bytes, 0);
    }

    #[test]
    fn test_backend_settings_derive_from_provider_section() {
        let config = Config::from_str(TEST_CONFIG).unwrap();
        let backend = config.backend();
        assert_eq!(backend.base_url, "http://gpu-box:8000/v1/");
        assert_eq!(backend.api_key.as_deref(), Some("sk-local"));
        assert_eq!(backend.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_model_provider_map_is_parsed() {
        let config = Config::from_str(TEST_CONFIG).unwrap();
        let map = config.model_provider_map();
        assert_eq!(map.resolve("gpt-4"), Some("openai"));
        assert_eq!(map.resolve("llama3"), Some("ollama"));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::from_str(TEST_CONFIG).unwrap();
        config
            .apply_env(env(&[
                ("PORT", "8080"),
                ("OPENAI_COMPAT_BASE_URL", "https://remote/v1"),
                ("OPENAI_COMPAT_TIMEOUT_SECONDS", "2.5"),
                ("MODEL_PROVIDER_MAP", "x=stub"),
                ("LLM_PROVIDER", "ollama"),
                ("RATE_LIMIT_ENABLED", "No"),
                ("API_KEYS", " a , ,b "),
                ("CORS_ALLOW_ORIGINS", "http://a.test,http://b.test"),
                ("LOG_LEVEL", "WARN"),
                ("LOG_REQUESTS", "YES"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.provider.base_url, "https://remote/v1");
        assert_eq!(config.provider.timeout_seconds, 2.5);
        assert_eq!(config.routing.model_provider_map, "x=stub");
        assert_eq!(config.routing.default_provider, "ollama");
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.auth.api_keys, vec!["a", "b"]);
        assert_eq!(
            config.cors.allow_origins,
            vec!["http://a.test", "http://b.test"]
        );
        assert_eq!(config.observability.log_level, "warn");
        assert!(config.observability.log_requests);
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("RATE_LIMIT_WINDOW_SECONDS", " "), ("OPENAI_COMPAT_API_KEY", "")]))
            .unwrap();
        assert_eq!(config.rate_limit.window_seconds, 60);
        assert_eq!(config.provider.api_key, None);
    }

    #[test]
    fn test_invalid_env_number_is_error() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("RATE_LIMIT_MAX_REQUESTS", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_MAX_REQUESTS"));
    }

    #[test]
    fn test_invalid_env_bool_is_error() {
        let mut config = Config::default();
        assert!(
            config
                .apply_env(env(&[("API_KEY_AUTH_ENABLED", "maybe")]))
                .is_err()
        );
    }

    #[test]
    fn test_load_with_env_validates_result() {
        let err = Config::load_with_env(
            None,
            env(&[("API_KEY_AUTH_ENABLED", "true")]),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let config = Config::load_with_env(
            None,
            env(&[("API_KEY_AUTH_ENABLED", "1"), ("API_KEYS", "secret")]),
        )
        .unwrap();
        assert!(config.auth.enabled);
    }

    #[test]
    fn test_from_file_reads_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEST_CONFIG.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_from_file_missing_file_is_read_error() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, AppError::ConfigFileRead { .. }));
    }

    #[test]
    fn test_from_file_bad_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[server\nport = ").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, AppError::ConfigParseFailed { .. }));
    }

    #[test]
    fn test_validation_rejects_non_http_base_url() {
        let mut config = Config::default();
        config.provider.base_url = "localhost:11434/v1".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_timeouts() {
        for timeout in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = Config::default();
            config.provider.timeout_seconds = timeout;
            assert!(config.validate().is_err(), "timeout {timeout} accepted");
        }
    }

    #[test]
    fn test_validation_rejects_zero_window_only_when_enabled() {
        let mut config = Config::default();
        config.rate_limit.window_seconds = 0;
        assert!(config.validate().is_ok());

        config.rate_limit.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_capacity_when_enabled() {
        let mut config = Config::default();
        config.rate_limit.enabled = true;
        config.rate_limit.max_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_sweep_interval() {
        let mut config = Config::default();
        config.rate_limit.sweep_interval_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_cors_origin() {
        let mut config = Config::default();
        config.cors.allow_origins = vec!["http://ok.test".to_string(), "bad\norigin".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_log_level() {
        let mut config = Config::default();
        config.observability.log_level = "verbose".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("observability.log_level"));
        assert!(err.to_string().contains("verbose"));

        for level in ["trace", "DEBUG", "Warn", "error"] {
            config.observability.log_level = level.to_string();
            assert!(config.validate().is_ok(), "{level} should be accepted");
        }
    }
}
