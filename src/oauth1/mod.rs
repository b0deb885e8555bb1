//! OAuth 1.0a consumer side
//!
//! Handles:
//! - Token types exchanged with the provider
//! - The `OAuth1Client` seam used by the gate
//! - Request signing and the reqwest-backed client
//! - Request tokens kept across the authorization redirect

mod client;
mod pending;
pub mod signature;

use std::collections::BTreeMap;
use std::fmt;

use axum::async_trait;

use crate::error::ProviderError;

pub use client::HttpOAuth1Client;
pub use pending::PendingRequestTokens;
pub use signature::SignatureMethod;

/// Temporary credentials issued for step 1 of the handshake
#[derive(Clone, PartialEq, Eq)]
pub struct RequestToken {
    pub token: String,
    pub secret: String,
    /// Provider acknowledged our `oauth_callback`
    pub callback_confirmed: bool,
}

impl RequestToken {
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
            callback_confirmed: true,
        }
    }
}

impl fmt::Debug for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestToken")
            .field("token", &self.token)
            .field("secret", &"<redacted>")
            .field("callback_confirmed", &self.callback_confirmed)
            .finish()
    }
}

/// Token credentials issued once the user authorized the request token
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub secret: String,
    /// Any additional fields from the token response (e.g. `screen_name`, `user_id`)
    pub parameters: BTreeMap<String, String>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &self.token)
            .field("secret", &"<redacted>")
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Client for the two provider round trips and the authorization URL
///
/// Implementations must be safe to share between concurrent requests.
/// Timeouts and cancellation belong to the implementation; the gate only
/// sees the resulting `ProviderError`.
#[async_trait]
pub trait OAuth1Client: Send + Sync {
    /// Obtain a fresh request token
    async fn request_token(&self) -> Result<RequestToken, ProviderError>;

    /// Exchange an authorized request token and its verifier for an access token
    async fn access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> Result<AccessToken, ProviderError>;

    /// Provider page where the user authorizes `request_token`
    fn authorization_url(&self, request_token: &RequestToken) -> String;
}
