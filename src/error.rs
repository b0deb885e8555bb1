//! Error types for oauth1-gate
//!
//! Handshake and session failures have their own types so the gate can
//! tell an infrastructure problem apart from a rejected credential.
//! Everything that reaches an HTTP handler is converted to `AppError`,
//! which implements `IntoResponse`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failure talking to the OAuth1 provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network or transport failure before a response was received
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    /// The provider answered, but not with a usable token response
    #[error("provider protocol error: {0}")]
    Protocol(String),

    /// The wait for the provider was cancelled or timed out
    #[error("interrupted while waiting for provider: {0}")]
    Interrupted(String),

    /// The outgoing request could not be signed
    #[error("request signing failed: {0}")]
    Signing(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Interrupted(err.to_string())
        } else if err.is_connect() || err.is_request() {
            ProviderError::Unreachable(err.to_string())
        } else {
            ProviderError::Protocol(err.to_string())
        }
    }
}

/// Failure while running the two provider round trips
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Access token exchange attempted without a request token from the same attempt
    #[error("access token exchange attempted without a matching request token")]
    Sequence,
}

/// The single error surfaced by the gate when a callback handshake fails
#[derive(Debug, Error)]
#[error("OAuth authentication failed: {source}")]
pub struct OAuthAuthenticationError {
    #[from]
    source: HandshakeError,
}

impl OAuthAuthenticationError {
    pub fn cause(&self) -> &HandshakeError {
        &self.source
    }

    pub fn is_sequence_error(&self) -> bool {
        matches!(self.source, HandshakeError::Sequence)
    }
}

impl From<ProviderError> for OAuthAuthenticationError {
    fn from(err: ProviderError) -> Self {
        HandshakeError::from(err).into()
    }
}

/// Credential rejected by the session layer
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// Access token response did not carry the configured principal field
    #[error("access token does not identify a principal (missing `{0}`)")]
    UnknownPrincipal(String),

    /// Principal is not on the allow-list
    #[error("principal `{0}` is not allowed to log in")]
    PrincipalNotAllowed(String),

    /// Session could not be issued
    #[error("session error: {0}")]
    Session(String),
}

/// Application-wide error type
///
/// Maps each failure to an HTTP status and a JSON error body.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Handshake with the provider failed (502, or 500 for sequencing bugs)
    #[error(transparent)]
    OAuthAuthentication(#[from] OAuthAuthenticationError),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Encryption/signing error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "unauthorized"),
            AppError::OAuthAuthentication(err) if err.is_sequence_error() => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "OAuth handshake sequencing error".to_string(),
                "oauth_sequence",
            ),
            AppError::OAuthAuthentication(_) => (
                StatusCode::BAD_GATEWAY,
                "OAuth provider error".to_string(),
                "oauth_provider",
            ),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Encryption(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "encryption")
            }
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, error_type, "Request failed");
        }

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL
            .with_label_values(&[error_type, "unknown"])
            .inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
