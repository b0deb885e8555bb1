//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use oauth1_gate::{AppState, config};
use tokio::net::TcpListener;

pub const AUTHORIZE_URL: &str = "https://provider.example/oauth/authorize";
pub const SESSION_SECRET: &str = "test-secret-key-32-bytes-long!!!";

/// What the fake provider has seen and how it should answer
#[derive(Default)]
pub struct ProviderState {
    pub request_token_calls: AtomicUsize,
    pub access_token_calls: AtomicUsize,
    pub fail_request_token: AtomicBool,
    pub fail_access_token: AtomicBool,
    /// (oauth_token, oauth_verifier) of every access token request
    pub exchanges: Mutex<Vec<(String, String)>>,
}

/// In-process OAuth1 provider speaking the form-encoded token protocol
pub struct FakeProvider {
    pub base_url: String,
    pub state: Arc<ProviderState>,
}

impl FakeProvider {
    pub async fn start() -> Self {
        let state = Arc::new(ProviderState::default());

        let app = Router::new()
            .route("/oauth/request_token", post(request_token))
            .route("/oauth/access_token", post(access_token))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn request_token_calls(&self) -> usize {
        self.state.request_token_calls.load(Ordering::SeqCst)
    }

    pub fn access_token_calls(&self) -> usize {
        self.state.access_token_calls.load(Ordering::SeqCst)
    }

    pub fn exchanges(&self) -> Vec<(String, String)> {
        self.state.exchanges.lock().unwrap().clone()
    }

    pub fn fail_request_token(&self) {
        self.state.fail_request_token.store(true, Ordering::SeqCst);
    }

    pub fn fail_access_token(&self) {
        self.state.fail_access_token.store(true, Ordering::SeqCst);
    }
}

/// Parse `Authorization: OAuth k="v", ...` into its decoded fields
fn oauth_fields(headers: &HeaderMap) -> HashMap<String, String> {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("OAuth "))
    else {
        return HashMap::new();
    };

    value
        .split(", ")
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, quoted)| {
            let raw = quoted.trim_matches('"');
            let decoded = urlencoding::decode(raw).unwrap().into_owned();
            (name.to_string(), decoded)
        })
        .collect()
}

async fn request_token(State(state): State<Arc<ProviderState>>, headers: HeaderMap) -> Response {
    let n = state.request_token_calls.fetch_add(1, Ordering::SeqCst) + 1;

    if state.fail_request_token.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance").into_response();
    }

    let fields = oauth_fields(&headers);
    if !fields.contains_key("oauth_callback") || !fields.contains_key("oauth_signature") {
        return (StatusCode::BAD_REQUEST, "missing oauth parameters").into_response();
    }

    format!("oauth_token=RT{n}&oauth_token_secret=rt-secret-{n}&oauth_callback_confirmed=true")
        .into_response()
}

async fn access_token(State(state): State<Arc<ProviderState>>, headers: HeaderMap) -> Response {
    state.access_token_calls.fetch_add(1, Ordering::SeqCst);

    if state.fail_access_token.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
    }

    let fields = oauth_fields(&headers);
    let token = fields.get("oauth_token").cloned().unwrap_or_default();
    let verifier = fields.get("oauth_verifier").cloned().unwrap_or_default();
    state
        .exchanges
        .lock()
        .unwrap()
        .push((token.clone(), verifier.clone()));

    if token.is_empty() || verifier.is_empty() {
        return (StatusCode::UNAUTHORIZED, "invalid verifier").into_response();
    }

    "oauth_token=AT1&oauth_token_secret=at-secret&screen_name=alice&user_id=42".into_response()
}

/// Address that refuses connections
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub provider: FakeProvider,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server, adjusting the configuration before start
    pub async fn with_config(customize: impl FnOnce(&mut config::AppConfig)) -> Self {
        oauth1_gate::metrics::init_metrics();

        let provider = FakeProvider::start().await;

        let mut config = test_config(&provider.base_url);
        customize(&mut config);

        // Initialize app state
        let state = AppState::new(config).unwrap();

        // Gate responses are checked as-is, never followed
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = oauth1_gate::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            addr: addr_str,
            state,
            provider,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Run a full callback and return the cookies it set
    pub async fn login(&self) -> HashMap<String, String> {
        let response = self
            .client
            .get(self.url("/auth/oauth1/callback?oauth_token=RT1&code=abc123"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 303);
        set_cookies(&response)
    }
}

fn test_config(provider_base: &str) -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            domain: "localhost".to_string(),
            protocol: "http".to_string(),
        },
        provider: config::ProviderConfig {
            consumer_key: "test-consumer".to_string(),
            consumer_secret: "test-consumer-secret".to_string(),
            request_token_url: format!("{provider_base}/oauth/request_token"),
            access_token_url: format!("{provider_base}/oauth/access_token"),
            authorize_url: AUTHORIZE_URL.to_string(),
            callback_url: "http://localhost/auth/oauth1/callback".to_string(),
            signature_method: oauth1_gate::oauth1::SignatureMethod::HmacSha1,
            timeout_seconds: 5,
        },
        gate: config::GateConfig {
            failure_url: "/auth/failure".to_string(),
            authorization_parameter_name: "code".to_string(),
            login_url: "/login".to_string(),
            success_url: "/".to_string(),
            request_token_mode: config::RequestTokenMode::PerRequest,
            pending_token_ttl_seconds: 600,
            max_pending_tokens: 10_000,
        },
        session: config::SessionConfig {
            secret: SESSION_SECRET.to_string(),
            max_age: 86_400,
            remember_me_max_age: 2_592_000,
            principal_parameter: "screen_name".to_string(),
            allowed_principals: Vec::new(),
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// Cookies set (not removed) by a response, by name
pub fn set_cookies(response: &reqwest::Response) -> HashMap<String, String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter(|value| !value.contains("Max-Age=0"))
        .filter_map(|value| value.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Cookie names a response removes
pub fn removed_cookies(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter(|value| value.contains("Max-Age=0"))
        .filter_map(|value| value.split('=').next())
        .map(str::to_string)
        .collect()
}

/// Render cookies as a `Cookie` request header
pub fn cookie_header<'a>(cookies: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    cookies
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn location(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
