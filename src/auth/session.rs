//! Session management
//!
//! Uses HMAC-signed tokens stored in cookies.
//! No server-side session storage needed.

use std::collections::HashSet;

use axum::async_trait;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::credential::OAuthCredential;
use super::exchange::GateExchange;
use crate::config::SessionConfig;
use crate::error::{AppError, AuthenticationError};

pub const SESSION_COOKIE: &str = "session";
pub const REMEMBER_ME_COOKIE: &str = "remember_me";

/// Who is making the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Identity taken from the access token response
    pub principal: String,
    /// Host the login came from
    pub host: Option<String>,
    /// Identity was verified in this session
    pub authenticated: bool,
    /// Identity is known from a remember-me cookie only
    pub remembered: bool,
    /// When session was created
    pub created_at: DateTime<Utc>,
    /// When session expires
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Session layer consumed by the gate
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Session attached to this exchange, if any
    async fn current_session(&self, exchange: &GateExchange) -> Option<Session>;

    /// Log in with an OAuth credential, attaching the new session to the exchange
    async fn login(
        &self,
        exchange: &mut GateExchange,
        credential: &OAuthCredential,
    ) -> Result<Session, AuthenticationError>;
}

/// Sign a payload
///
/// Token format: base64(payload).base64(hmac_sha256(payload))
///
/// # Arguments
/// * `payload` - Data to encode
/// * `secret` - HMAC secret key
pub fn sign_payload<T: Serialize>(payload: &T, secret: &str) -> Result<String, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    // 1. Serialize payload to JSON
    let json = serde_json::to_string(payload).map_err(|e| AppError::Internal(e.into()))?;

    // 2. Base64 encode the payload
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(json.as_bytes());

    // 3. Create HMAC-SHA256 signature
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    // 4. Return "{payload}.{signature}"
    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify and decode a signed payload
///
/// # Errors
/// Returns error if signature is invalid or token is malformed
pub fn verify_payload<T: DeserializeOwned>(token: &str, secret: &str) -> Result<T, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    // 1. Split token into payload and signature
    let Some((payload_b64, signature_b64)) = token.split_once('.') else {
        return Err(AppError::Unauthorized);
    };
    if signature_b64.contains('.') {
        return Err(AppError::Unauthorized);
    }

    // 2. Verify HMAC signature
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());

    let expected_signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::Unauthorized)?;

    mac.verify_slice(&expected_signature)
        .map_err(|_| AppError::Unauthorized)?;

    // 3. Decode and deserialize payload
    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AppError::Unauthorized)?;

    serde_json::from_slice(&payload_bytes).map_err(|_| AppError::Unauthorized)
}

/// Session store keeping sessions in signed cookies
///
/// `session` carries an authenticated session. `remember_me` outlives it
/// and yields a remembered, unauthenticated session.
pub struct SignedCookieSessionStore {
    secret: String,
    max_age: Duration,
    remember_me_max_age: Duration,
    principal_parameter: String,
    allowed_principals: HashSet<String>,
    secure: bool,
}

impl SignedCookieSessionStore {
    pub fn new(config: &SessionConfig, secure: bool) -> Self {
        Self {
            secret: config.secret.clone(),
            max_age: Duration::seconds(config.max_age),
            remember_me_max_age: Duration::seconds(config.remember_me_max_age),
            principal_parameter: config.principal_parameter.clone(),
            allowed_principals: config.allowed_principals.iter().cloned().collect(),
            secure,
        }
    }

    fn cookie(&self, name: &'static str, value: String, max_age: Duration) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(max_age.num_seconds()))
            .build()
    }

    fn read<T: DeserializeOwned>(&self, exchange: &GateExchange, name: &str) -> Option<T> {
        let cookie = exchange.cookies().get(name)?;
        verify_payload(cookie.value(), &self.secret).ok()
    }

    /// Drop both session cookies
    pub fn clear(&self, jar: axum_extra::extract::CookieJar) -> axum_extra::extract::CookieJar {
        jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
            .remove(Cookie::build(REMEMBER_ME_COOKIE).path("/"))
    }
}

#[async_trait]
impl SessionStore for SignedCookieSessionStore {
    async fn current_session(&self, exchange: &GateExchange) -> Option<Session> {
        if let Some(session) = self.read::<Session>(exchange, SESSION_COOKIE) {
            if !session.is_expired() && session.authenticated {
                return Some(session);
            }
        }

        let remembered = self.read::<Session>(exchange, REMEMBER_ME_COOKIE)?;
        if remembered.is_expired() {
            return None;
        }
        Some(Session {
            authenticated: false,
            remembered: true,
            ..remembered
        })
    }

    async fn login(
        &self,
        exchange: &mut GateExchange,
        credential: &OAuthCredential,
    ) -> Result<Session, AuthenticationError> {
        let principal = credential
            .principal(&self.principal_parameter)
            .ok_or_else(|| AuthenticationError::UnknownPrincipal(self.principal_parameter.clone()))?
            .to_string();

        if !self.allowed_principals.is_empty() && !self.allowed_principals.contains(&principal) {
            return Err(AuthenticationError::PrincipalNotAllowed(principal));
        }

        let now = Utc::now();
        let session = Session {
            principal,
            host: credential.host.clone(),
            authenticated: true,
            remembered: false,
            created_at: now,
            expires_at: now + self.max_age,
        };
        let remember_me = Session {
            authenticated: false,
            remembered: true,
            expires_at: now + self.remember_me_max_age,
            ..session.clone()
        };

        let session_token = sign_payload(&session, &self.secret)
            .map_err(|e| AuthenticationError::Session(e.to_string()))?;
        let remember_token = sign_payload(&remember_me, &self.secret)
            .map_err(|e| AuthenticationError::Session(e.to_string()))?;

        let session_cookie = self.cookie(SESSION_COOKIE, session_token, self.max_age);
        let remember_cookie =
            self.cookie(REMEMBER_ME_COOKIE, remember_token, self.remember_me_max_age);
        exchange.update_cookies(|jar| jar.add(session_cookie).add(remember_cookie));

        Ok(session)
    }
}
