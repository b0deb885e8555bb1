//! OAuth1 authentication gate
//!
//! Handles:
//! - The gate state machine deciding each request's handshake phase
//! - Session management
//! - Redirects around the handshake
//! - Authentication middleware

mod credential;
mod exchange;
mod filter;
mod middleware;
mod redirect;
pub mod session;

pub use credential::{AuthenticationAttempt, OAuthCredential, REQUEST_TOKEN_PARAMETER};
pub use exchange::{GateExchange, GateRequest};
pub use filter::{AuthenticationGateFilter, GateSettings};
pub use middleware::{CurrentUser, require_oauth1_session};
pub use redirect::{CookieRedirectCoordinator, RedirectCoordinator, SAVED_REQUEST_COOKIE};
pub use session::{
    REMEMBER_ME_COOKIE, SESSION_COOKIE, Session, SessionStore, SignedCookieSessionStore,
};
