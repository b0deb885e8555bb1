//! Routes behind the gate

use axum::{
    Json, Router, middleware,
    response::{IntoResponse, Redirect},
    routing::get,
};

use crate::AppState;
use crate::auth::{CurrentUser, require_oauth1_session};

/// Create protected router
///
/// Routes:
/// - GET / - Current session
/// - GET /auth/oauth1/callback - Provider callback
pub fn protected_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(whoami))
        .route("/auth/oauth1/callback", get(callback_landing))
        .route_layer(middleware::from_fn_with_state(
            state,
            require_oauth1_session,
        ))
}

/// GET /
async fn whoami(CurrentUser(session): CurrentUser) -> impl IntoResponse {
    Json(serde_json::json!({
        "principal": session.principal,
        "authenticated": session.authenticated,
        "expires_at": session.expires_at,
    }))
}

/// GET /auth/oauth1/callback
///
/// The gate consumes the callback itself; reaching this handler means the
/// session already existed.
async fn callback_landing() -> impl IntoResponse {
    Redirect::to("/")
}
