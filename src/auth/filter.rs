//! OAuth1 authentication gate
//!
//! Decides, per request, which leg of the three-legged flow the request
//! represents and drives it:
//!
//! ```text
//! START
//!   -> authenticated session             -> ALLOWED
//!   -> no session, credential parameter  -> CALLBACK
//!   -> no session, no credential         -> INITIATE
//!
//! CALLBACK
//!   -> handshake ok, login ok            -> success redirect
//!   -> handshake ok, login rejected      -> success redirect if authenticated/remembered,
//!                                           failure redirect otherwise
//!   -> handshake error                   -> OAuthAuthenticationError (no redirect)
//!   -> persisted mode, no pending token  -> handled as login rejected
//!
//! INITIATE
//!   -> authorization URL obtained        -> redirect to provider
//!   -> provider failure                  -> redirect to configured login URL
//! ```
//!
//! Nothing is retried. OAuth1 request tokens are single use, so a failed
//! callback is surfaced and the user restarts by reloading the page.

use std::sync::Arc;

use super::credential::{AuthenticationAttempt, OAuthCredential};
use super::exchange::{GateExchange, GateRequest};
use super::redirect::RedirectCoordinator;
use super::session::SessionStore;
use crate::config::{GateConfig, RequestTokenMode};
use crate::error::{HandshakeError, OAuthAuthenticationError};
use crate::metrics::{GATE_DECISIONS_TOTAL, LOGIN_ATTEMPTS_TOTAL};
use crate::oauth1::{AccessToken, OAuth1Client, PendingRequestTokens, RequestToken};

const MAX_LOGGED_MESSAGE: usize = 200;

/// Immutable gate settings
#[derive(Debug, Clone)]
pub struct GateSettings {
    /// Redirect target on confirmed authentication failure
    pub failure_url: String,
    /// Request parameter carrying the callback credential
    pub authorization_parameter_name: String,
    /// Fallback when the provider authorization URL cannot be obtained
    pub login_url: String,
    pub request_token_mode: RequestTokenMode,
}

impl GateSettings {
    pub const DEFAULT_AUTHORIZATION_PARAMETER: &'static str = "code";
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            failure_url: "/auth/failure".to_string(),
            authorization_parameter_name: Self::DEFAULT_AUTHORIZATION_PARAMETER.to_string(),
            login_url: "/login".to_string(),
            request_token_mode: RequestTokenMode::PerRequest,
        }
    }
}

impl From<&GateConfig> for GateSettings {
    fn from(config: &GateConfig) -> Self {
        Self {
            failure_url: config.failure_url.clone(),
            authorization_parameter_name: config.authorization_parameter_name.clone(),
            login_url: config.login_url.clone(),
            request_token_mode: config.request_token_mode,
        }
    }
}

/// One handshake's request token, consumed by the exchange that follows it
struct Handshake<'a> {
    client: &'a dyn OAuth1Client,
    request_token: Option<RequestToken>,
}

impl<'a> Handshake<'a> {
    fn new(client: &'a dyn OAuth1Client) -> Self {
        Self {
            client,
            request_token: None,
        }
    }

    /// Continue a handshake whose request token was issued earlier
    fn resume(client: &'a dyn OAuth1Client, request_token: RequestToken) -> Self {
        Self {
            client,
            request_token: Some(request_token),
        }
    }

    async fn obtain_request_token(&mut self) -> Result<&RequestToken, HandshakeError> {
        let token = self.client.request_token().await?;
        Ok(self.request_token.insert(token))
    }

    async fn exchange(&mut self, verifier: &str) -> Result<AccessToken, HandshakeError> {
        let request_token = self.request_token.take().ok_or(HandshakeError::Sequence)?;
        Ok(self.client.access_token(&request_token, verifier).await?)
    }
}

fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_LOGGED_MESSAGE {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(MAX_LOGGED_MESSAGE).collect();
    truncated.push_str("...");
    truncated
}

fn record_decision(outcome: &str) {
    GATE_DECISIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Outcome of matching a callback against the saved request tokens
enum PendingLookup {
    /// Per-request mode: the callback fetches its own request token
    NotPersisted,
    Found(RequestToken),
    /// Missing, unknown, expired or already consumed `oauth_token`
    Unmatched,
}

/// Gate in front of protected resources
///
/// Holds no per-request state; one instance serves all requests.
pub struct AuthenticationGateFilter {
    settings: GateSettings,
    oauth1_client: Arc<dyn OAuth1Client>,
    sessions: Arc<dyn SessionStore>,
    redirects: Arc<dyn RedirectCoordinator>,
    pending_tokens: Option<Arc<PendingRequestTokens>>,
}

impl AuthenticationGateFilter {
    pub fn new(
        settings: GateSettings,
        oauth1_client: Arc<dyn OAuth1Client>,
        sessions: Arc<dyn SessionStore>,
        redirects: Arc<dyn RedirectCoordinator>,
    ) -> Self {
        Self {
            settings,
            oauth1_client,
            sessions,
            redirects,
            pending_tokens: None,
        }
    }

    /// Store used to carry request tokens across the authorization redirect
    /// in `RequestTokenMode::Persisted`.
    pub fn with_pending_tokens(mut self, pending_tokens: Arc<PendingRequestTokens>) -> Self {
        self.pending_tokens = Some(pending_tokens);
        self
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    /// The gate never grants access by itself.
    pub fn is_access_allowed(&self, _request: &GateRequest) -> bool {
        false
    }

    /// Process one request
    ///
    /// Returns whether the request was handled. On `Ok`, the exchange holds
    /// the redirect to send, if any. An authenticated request comes back
    /// handled with its session recorded on the exchange and no redirect.
    ///
    /// # Errors
    /// Returns `OAuthAuthenticationError` if a callback handshake with the
    /// provider fails. No redirect is issued in that case.
    pub async fn decide(
        &self,
        exchange: &mut GateExchange,
    ) -> Result<bool, OAuthAuthenticationError> {
        let session = self.sessions.current_session(exchange).await;

        if let Some(session) = session.filter(|session| session.authenticated) {
            tracing::trace!(principal = %session.principal, "Authenticated session, allowing");
            exchange.set_session(session);
            record_decision("allowed");
            return Ok(true);
        }

        let attempt = AuthenticationAttempt::from_request(
            exchange.request(),
            &self.settings.authorization_parameter_name,
        );

        match attempt {
            Some(attempt) => self.handle_callback(exchange, attempt).await,
            None => {
                self.initiate(exchange).await;
                Ok(false)
            }
        }
    }

    async fn handle_callback(
        &self,
        exchange: &mut GateExchange,
        attempt: AuthenticationAttempt,
    ) -> Result<bool, OAuthAuthenticationError> {
        let request_token = match self.pending_request_token(&attempt).await {
            PendingLookup::NotPersisted => None,
            PendingLookup::Found(token) => Some(token),
            PendingLookup::Unmatched => {
                LOGIN_ATTEMPTS_TOTAL.with_label_values(&["failure"]).inc();
                tracing::warn!(
                    host = attempt.host.as_deref().unwrap_or("unknown"),
                    "Callback does not match a pending request token"
                );
                return Ok(self.on_login_failure(exchange).await);
            }
        };

        let credential = match self.complete_handshake(&attempt, request_token).await {
            Ok(credential) => credential,
            Err(error) => {
                tracing::error!(
                    host = attempt.host.as_deref().unwrap_or("unknown"),
                    error = %truncate_message(&error.to_string()),
                    "OAuth handshake failed"
                );
                record_decision("handshake_error");
                return Err(error);
            }
        };

        match self.sessions.login(exchange, &credential).await {
            Ok(session) => {
                LOGIN_ATTEMPTS_TOTAL.with_label_values(&["success"]).inc();
                tracing::info!(
                    principal = %session.principal,
                    host = attempt.host.as_deref().unwrap_or("unknown"),
                    "OAuth login succeeded"
                );
                exchange.set_session(session);
                Ok(self.on_login_success(exchange))
            }
            Err(error) => {
                LOGIN_ATTEMPTS_TOTAL.with_label_values(&["failure"]).inc();
                tracing::error!(
                    host = attempt.host.as_deref().unwrap_or("unknown"),
                    error = %truncate_message(&error.to_string()),
                    "OAuth authentication exception"
                );
                Ok(self.on_login_failure(exchange).await)
            }
        }
    }

    async fn initiate(&self, exchange: &mut GateExchange) {
        let login_url = self.login_url().await;
        self.redirects
            .save_request_and_redirect_to_login(exchange, &login_url);
        record_decision(if login_url == self.settings.login_url {
            "default_login_redirect"
        } else {
            "provider_redirect"
        });
    }

    /// Claim the request token saved by `login_url` for this callback
    async fn pending_request_token(&self, attempt: &AuthenticationAttempt) -> PendingLookup {
        let pending = match (self.settings.request_token_mode, &self.pending_tokens) {
            (RequestTokenMode::Persisted, Some(pending)) => pending,
            _ => return PendingLookup::NotPersisted,
        };

        let saved = match attempt.request_token_key.as_deref() {
            Some(key) => pending.take(key).await,
            None => None,
        };
        saved.map_or(PendingLookup::Unmatched, PendingLookup::Found)
    }

    /// Run both provider round trips and wrap the access token
    ///
    /// With `request_token` set (persisted mode) the handshake resumes from
    /// it; otherwise a fresh request token is obtained first.
    ///
    /// # Errors
    /// Any provider failure is wrapped once into `OAuthAuthenticationError`.
    pub async fn complete_handshake(
        &self,
        attempt: &AuthenticationAttempt,
        request_token: Option<RequestToken>,
    ) -> Result<OAuthCredential, OAuthAuthenticationError> {
        let client = self.oauth1_client.as_ref();

        let mut handshake = match request_token {
            Some(token) => Handshake::resume(client, token),
            None => {
                let mut handshake = Handshake::new(client);
                handshake.obtain_request_token().await?;
                handshake
            }
        };

        let access_token = handshake.exchange(&attempt.credential).await?;
        tracing::debug!(
            host = attempt.host.as_deref().unwrap_or("unknown"),
            "Obtained access token"
        );

        Ok(OAuthCredential::new(attempt.host.clone(), access_token))
    }

    /// Provider authorization URL for a fresh request token
    ///
    /// Never fails: on any provider error the configured login URL is
    /// returned instead.
    pub async fn login_url(&self) -> String {
        let mut handshake = Handshake::new(self.oauth1_client.as_ref());
        let request_token = match handshake.obtain_request_token().await {
            Ok(token) => token.clone(),
            Err(error) => {
                tracing::warn!(
                    error = %truncate_message(&error.to_string()),
                    fallback = %self.settings.login_url,
                    "Could not obtain request token, using fallback login URL"
                );
                return self.settings.login_url.clone();
            }
        };

        let authorization_url = self.oauth1_client.authorization_url(&request_token);

        if self.settings.request_token_mode == RequestTokenMode::Persisted {
            if let Some(pending) = &self.pending_tokens {
                if !pending.insert(request_token).await {
                    return self.settings.login_url.clone();
                }
            }
        }

        authorization_url
    }

    fn on_login_success(&self, exchange: &mut GateExchange) -> bool {
        self.redirects.issue_success_redirect(exchange);
        record_decision("success_redirect");
        true
    }

    /// Re-check the session before sending the user to the failure page:
    /// another request may already have logged them in, or they may be
    /// remembered.
    async fn on_login_failure(&self, exchange: &mut GateExchange) -> bool {
        let session = self.sessions.current_session(exchange).await;

        match session {
            Some(session) if session.authenticated || session.remembered => {
                tracing::debug!(
                    principal = %session.principal,
                    "Login rejected but session already identified, redirecting to success"
                );
                self.redirects.issue_success_redirect(exchange);
                record_decision("success_redirect");
            }
            _ => {
                self.redirects
                    .issue_failure_redirect(exchange, &self.settings.failure_url);
                record_decision("failure_redirect");
            }
        }

        false
    }
}
