//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::net::IpAddr;

use crate::oauth1::SignatureMethod;

const MIN_SESSION_SECRET_BYTES: usize = 32;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub gate: GateConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "app.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://app.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// OAuth1 provider (consumer) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Endpoint issuing temporary credentials
    pub request_token_url: String,
    /// Endpoint exchanging an authorized request token
    pub access_token_url: String,
    /// User-facing authorization page
    pub authorize_url: String,
    /// Sent as `oauth_callback` when requesting a token
    pub callback_url: String,
    #[serde(default)]
    pub signature_method: SignatureMethod,
    /// HTTP timeout for each provider round trip (default: 30)
    #[serde(default = "default_provider_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_provider_timeout_seconds() -> u64 {
    30
}

/// How the request token obtained when starting a login relates to the
/// one exchanged on callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestTokenMode {
    /// Fetch a fresh request token on every handshake step, including the callback.
    #[default]
    PerRequest,
    /// Keep the request token issued when the login started and consume it on callback.
    Persisted,
}

/// Gate behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Redirect target when authentication is rejected
    pub failure_url: String,
    /// Query parameter carrying the callback credential (default: "code")
    pub authorization_parameter_name: String,
    /// Fallback login URL when the provider cannot be reached
    pub login_url: String,
    /// Success redirect when no original request was saved
    pub success_url: String,
    #[serde(default)]
    pub request_token_mode: RequestTokenMode,
    /// Lifetime of persisted request tokens in seconds (default: 600)
    pub pending_token_ttl_seconds: u64,
    /// Upper bound on logins awaiting their callback in persisted mode (default: 10000)
    pub max_pending_tokens: usize,
}

/// Session cookie configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session secret key (32+ bytes)
    pub secret: String,
    /// Session max age in seconds (default: 86400 = 1 day)
    pub max_age: i64,
    /// Remember-me max age in seconds (default: 2592000 = 30 days)
    pub remember_me_max_age: i64,
    /// Access token response field naming the user (default: "screen_name")
    pub principal_parameter: String,
    /// Principals allowed to log in; empty allows everyone
    #[serde(default)]
    pub allowed_principals: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// Filter used when RUST_LOG is not set
    pub fn default_directives(&self) -> String {
        format!(
            "oauth1_gate={},tower_http=debug",
            self.level.trim().to_ascii_lowercase()
        )
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (OAUTH1_GATE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("provider.signature_method", "HMAC-SHA1")?
            .set_default("provider.timeout_seconds", 30)?
            .set_default("gate.failure_url", "/auth/failure")?
            .set_default("gate.authorization_parameter_name", "code")?
            .set_default("gate.login_url", "/login")?
            .set_default("gate.success_url", "/")?
            .set_default("gate.request_token_mode", "per_request")?
            .set_default("gate.pending_token_ttl_seconds", 600)?
            .set_default("gate.max_pending_tokens", 10_000)?
            .set_default("session.max_age", 86400)?
            .set_default("session.remember_me_max_age", 2592000)?
            .set_default("session.principal_parameter", "screen_name")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (OAUTH1_GATE__*)
            .add_source(
                Environment::with_prefix("OAUTH1_GATE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("session.allowed_principals")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        if self.session.secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
            return Err(AppError::Config(format!(
                "session.secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.session.max_age <= 0 || self.session.remember_me_max_age <= 0 {
            return Err(AppError::Config(
                "session.max_age and session.remember_me_max_age must be greater than 0"
                    .to_string(),
            ));
        }

        if self.gate.authorization_parameter_name.trim().is_empty() {
            return Err(AppError::Config(
                "gate.authorization_parameter_name must not be empty".to_string(),
            ));
        }

        for (key, value) in [
            ("provider.request_token_url", &self.provider.request_token_url),
            ("provider.access_token_url", &self.provider.access_token_url),
            ("provider.authorize_url", &self.provider.authorize_url),
            ("provider.callback_url", &self.provider.callback_url),
        ] {
            let parsed = url::Url::parse(value)
                .map_err(|e| AppError::Config(format!("{key} must be an absolute URL: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AppError::Config(format!(
                    "{key} must use http or https, got {}",
                    parsed.scheme()
                )));
            }
        }

        if self.provider.consumer_key.is_empty() {
            return Err(AppError::Config(
                "provider.consumer_key must not be empty".to_string(),
            ));
        }

        if self.gate.max_pending_tokens == 0 {
            return Err(AppError::Config(
                "gate.max_pending_tokens must be greater than 0".to_string(),
            ));
        }

        if self.logging.level.trim().parse::<tracing::Level>().is_err() {
            return Err(AppError::Config(format!(
                "logging.level must be one of trace, debug, info, warn, error, got {:?}",
                self.logging.level
            )));
        }

        if self.should_use_secure_cookies() && !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

pub(crate) fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

#[cfg(test)]
impl AppConfig {
    /// Local configuration whose provider refuses connections
    pub(crate) fn for_tests() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            provider: ProviderConfig {
                consumer_key: "consumer-key".to_string(),
                consumer_secret: "consumer-secret".to_string(),
                request_token_url: "http://127.0.0.1:9/oauth/request_token".to_string(),
                access_token_url: "http://127.0.0.1:9/oauth/access_token".to_string(),
                authorize_url: "https://provider.example/oauth/authorize".to_string(),
                callback_url: "http://localhost:8080/auth/oauth1/callback".to_string(),
                signature_method: SignatureMethod::HmacSha1,
                timeout_seconds: 30,
            },
            gate: GateConfig {
                failure_url: "/auth/failure".to_string(),
                authorization_parameter_name: "code".to_string(),
                login_url: "/login".to_string(),
                success_url: "/".to_string(),
                request_token_mode: RequestTokenMode::PerRequest,
                pending_token_ttl_seconds: 600,
                max_pending_tokens: 10_000,
            },
            session: SessionConfig {
                secret: "x".repeat(32),
                max_age: 86_400,
                remember_me_max_age: 2_592_000,
                principal_parameter: "screen_name".to_string(),
                allowed_principals: Vec::new(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig::for_tests()
    }

    #[test]
    fn validate_accepts_http_on_localhost() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
    }

    #[test]
    fn validate_rejects_short_session_secret() {
        let mut config = valid_config();
        config.session.secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("session secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("session.secret")
        ));
    }

    #[test]
    fn validate_rejects_empty_authorization_parameter() {
        let mut config = valid_config();
        config.gate.authorization_parameter_name = "  ".to_string();

        let error = config
            .validate()
            .expect_err("blank parameter name must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("gate.authorization_parameter_name")
        ));
    }

    #[test]
    fn validate_rejects_relative_provider_url() {
        let mut config = valid_config();
        config.provider.access_token_url = "/oauth/access_token".to_string();

        let error = config
            .validate()
            .expect_err("relative provider url must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("provider.access_token_url")
        ));
    }

    #[test]
    fn validate_rejects_http_for_non_local_domain() {
        let mut config = valid_config();
        config.server.domain = "app.example.com".to_string();
        config.server.protocol = "http".to_string();

        let error = config
            .validate()
            .expect_err("public domains must require https");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("server.protocol must be https")
        ));
    }

    #[test]
    fn validate_rejects_unknown_log_level() {
        let mut config = valid_config();
        config.logging.level = "verbose".to_string();

        let error = config
            .validate()
            .expect_err("unknown log level must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("logging.level")
        ));
    }

    #[test]
    fn validate_rejects_zero_pending_token_capacity() {
        let mut config = valid_config();
        config.gate.max_pending_tokens = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn default_directives_follow_configured_level() {
        let mut config = valid_config();
        config.logging.level = "DEBUG".to_string();

        assert_eq!(
            config.logging.default_directives(),
            "oauth1_gate=debug,tower_http=debug"
        );
    }

    #[test]
    fn request_token_mode_defaults_to_per_request() {
        assert_eq!(RequestTokenMode::default(), RequestTokenMode::PerRequest);
    }
}
