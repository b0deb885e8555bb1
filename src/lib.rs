//! oauth1-gate - An OAuth1 three-legged authentication gate for axum
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Protected routes behind require_oauth1_session           │
//! │  - Login / failure / logout pages, metrics                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 AuthenticationGateFilter                     │
//! │  - Allowed / callback / initiate decision                   │
//! │  - Request token -> access token -> login sequencing        │
//! └─────────────────────────────────────────────────────────────┘
//!            │                   │                    │
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │   SessionStore   │ │   OAuth1Client   │ │ RedirectCoord.   │
//! │ signed cookies   │ │ reqwest + HMAC   │ │ saved request    │
//! └──────────────────┘ └──────────────────┘ └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `auth`: The gate, sessions, redirects and middleware
//! - `oauth1`: Provider client, request signing, pending request tokens
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod oauth1;

use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// The OAuth1 gate
    pub gate: Arc<auth::AuthenticationGateFilter>,

    /// Cookie session store (also used by logout)
    pub sessions: Arc<auth::SignedCookieSessionStore>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Build HTTP client for the provider
    /// 2. Create OAuth1 client
    /// 3. Create session store and redirect coordinator
    /// 4. Assemble the gate
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub fn new(config: config::AppConfig) -> error::Result<Self> {
        tracing::info!("Initializing application state...");

        let secure_cookies = config.should_use_secure_cookies();
        if !secure_cookies {
            tracing::warn!(
                host = %config::normalized_server_host(&config.server.domain),
                protocol = %config.server.protocol,
                "Using insecure session cookies for local development"
            );
        }

        // 1. Initialize HTTP client
        let http_client = Arc::new(
            reqwest::Client::builder()
                .user_agent(concat!("oauth1-gate/", env!("CARGO_PKG_VERSION")))
                .timeout(Duration::from_secs(config.provider.timeout_seconds))
                .build()
                .map_err(|e| error::AppError::Internal(e.into()))?,
        );

        // 2. OAuth1 client
        let oauth1_client = Arc::new(oauth1::HttpOAuth1Client::new(
            &config.provider,
            http_client.clone(),
        )?);
        tracing::info!(
            request_token_url = %config.provider.request_token_url,
            signature_method = config.provider.signature_method.as_str(),
            "OAuth1 client initialized"
        );

        // 3. Session store and redirects
        let sessions = Arc::new(auth::SignedCookieSessionStore::new(
            &config.session,
            secure_cookies,
        ));
        let redirects = Arc::new(auth::CookieRedirectCoordinator::new(
            config.gate.success_url.clone(),
            secure_cookies,
        ));

        // 4. Gate
        let mut gate = auth::AuthenticationGateFilter::new(
            auth::GateSettings::from(&config.gate),
            oauth1_client,
            sessions.clone(),
            redirects,
        );
        if config.gate.request_token_mode == config::RequestTokenMode::Persisted {
            gate = gate.with_pending_tokens(Arc::new(
                oauth1::PendingRequestTokens::with_capacity(
                    Duration::from_secs(config.gate.pending_token_ttl_seconds),
                    config.gate.max_pending_tokens,
                ),
            ));
        }
        tracing::info!(
            mode = ?gate.settings().request_token_mode,
            parameter = %gate.settings().authorization_parameter_name,
            "Gate initialized"
        );

        Ok(Self {
            gate: Arc::new(gate),
            sessions,
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::auth_pages_router())
        .merge(api::protected_router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
