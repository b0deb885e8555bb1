//! Authentication middleware
//!
//! Protects routes behind the OAuth1 gate.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use super::exchange::{GateExchange, GateRequest};
use super::session::Session;
use crate::AppState;
use crate::error::AppError;

/// Middleware running every request through the gate
///
/// Redirects issued by the gate are returned as-is. A request the gate
/// handled without redirecting carries an authenticated session and is
/// passed on with the `Session` in its extensions.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/", ...)
///     .route_layer(middleware::from_fn_with_state(state.clone(), require_oauth1_session));
/// ```
pub async fn require_oauth1_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let mut exchange = GateExchange::new(GateRequest::from_parts(&parts));

    let handled = state.gate.decide(&mut exchange).await?;

    if exchange.redirect_target().is_some() {
        return Ok(exchange.into_response());
    }

    if !handled {
        return Err(AppError::Unauthorized);
    }

    let mut request = Request::from_parts(parts, body);
    if let Some(session) = exchange.take_session() {
        request.extensions_mut().insert(session);
    }

    Ok(next.run(request).await)
}

/// Extractor for current authenticated user
///
/// Use in handlers behind `require_oauth1_session` to get the current session.
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentUser(session): CurrentUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", session.principal)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Session);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AppError::Unauthorized)
    }
}
