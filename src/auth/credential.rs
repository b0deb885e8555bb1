//! Authentication attempt and the credential handed to the session layer

use super::exchange::GateRequest;
use crate::oauth1::AccessToken;

/// Query parameter the provider echoes back with the authorized request token
pub const REQUEST_TOKEN_PARAMETER: &str = "oauth_token";

/// One callback being processed; lives for a single request
#[derive(Debug, Clone)]
pub struct AuthenticationAttempt {
    /// Verifier sent back by the provider
    pub credential: String,
    /// Host identity of the caller
    pub host: Option<String>,
    /// `oauth_token` echoed back by the provider, when present
    pub request_token_key: Option<String>,
}

impl AuthenticationAttempt {
    /// Returns `None` when the request does not carry `parameter_name`
    pub fn from_request(request: &GateRequest, parameter_name: &str) -> Option<Self> {
        let credential = request.parameter(parameter_name)?;
        Some(Self {
            credential: credential.to_string(),
            host: request.host().map(ToOwned::to_owned),
            request_token_key: request
                .parameter(REQUEST_TOKEN_PARAMETER)
                .map(ToOwned::to_owned),
        })
    }
}

/// Access token plus the caller's host, presented to `SessionStore::login`
#[derive(Debug, Clone)]
pub struct OAuthCredential {
    pub host: Option<String>,
    pub access_token: AccessToken,
}

impl OAuthCredential {
    pub fn new(host: Option<String>, access_token: AccessToken) -> Self {
        Self { host, access_token }
    }

    /// Principal named by the given access token response field
    pub fn principal(&self, parameter: &str) -> Option<&str> {
        self.access_token
            .parameter(parameter)
            .filter(|value| !value.is_empty())
    }
}
