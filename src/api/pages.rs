//! Public authentication pages
//!
//! Routes that must stay reachable without a session: the fallback login
//! page, the failure page and logout.

use axum::{
    Router,
    extract::State,
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;

use crate::AppState;

/// Create public auth router
///
/// Routes:
/// - GET /login - Fallback login page
/// - GET /auth/failure - Authentication failure page
/// - POST /logout - Logout
pub fn auth_pages_router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page))
        .route("/auth/failure", get(failure_page))
        .route("/logout", post(logout))
}

/// GET /login
///
/// Shown when the provider could not issue a request token.
async fn login_page() -> impl IntoResponse {
    Html(
        r#"
        <!DOCTYPE html>
        <html>
        <head><title>Login</title></head>
        <body>
            <h1>Sign in</h1>
            <p>The identity provider is not reachable right now.</p>
            <a href="/">Try again</a>
        </body>
        </html>
    "#,
    )
}

/// GET /auth/failure
async fn failure_page() -> impl IntoResponse {
    Html(
        r#"
        <!DOCTYPE html>
        <html>
        <head><title>Sign-in failed</title></head>
        <body>
            <h1>Sign-in failed</h1>
            <p>Your account is not allowed to sign in here.</p>
            <a href="/">Start over</a>
        </body>
        </html>
    "#,
    )
}

/// POST /logout
///
/// Clears session cookies and redirects to home, which restarts the handshake.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    (state.sessions.clear(jar), Redirect::to("/"))
}
