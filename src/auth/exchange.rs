//! Per-request gate exchange
//!
//! `GateRequest` is the read-only view of the incoming request the gate
//! needs. `GateExchange` pairs it with the response being assembled: the
//! outgoing cookie jar and at most one redirect.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Uri, request::Parts};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;

use super::session::Session;

/// Incoming request as seen by the gate
#[derive(Debug, Clone)]
pub struct GateRequest {
    uri: Uri,
    headers: HeaderMap,
    host: Option<String>,
    parameters: HashMap<String, String>,
}

impl GateRequest {
    /// Build from request parts
    ///
    /// Host identity is taken from the first `X-Forwarded-For` entry, then
    /// the peer address (when served with connect info), then `Host`.
    pub fn from_parts(parts: &Parts) -> Self {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Self::build(parts.uri.clone(), parts.headers.clone(), peer)
    }

    pub fn new(uri: Uri, headers: HeaderMap) -> Self {
        Self::build(uri, headers, None)
    }

    fn build(uri: Uri, headers: HeaderMap, peer: Option<String>) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned);
        let host_header = headers
            .get(axum::http::header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned);

        let mut parameters = HashMap::new();
        if let Some(query) = uri.query() {
            for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
                parameters
                    .entry(name.into_owned())
                    .or_insert_with(|| value.into_owned());
            }
        }

        Self {
            uri,
            headers,
            host: forwarded.or(peer).or(host_header),
            parameters,
        }
    }

    /// First value of a query parameter
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Path and query of the request, for replay after login
    pub fn original_url(&self) -> String {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| self.uri.path().to_string())
    }
}

/// Request view plus the response under construction
#[derive(Debug)]
pub struct GateExchange {
    request: GateRequest,
    jar: CookieJar,
    redirect: Option<String>,
    session: Option<Session>,
}

impl GateExchange {
    pub fn new(request: GateRequest) -> Self {
        let jar = CookieJar::from_headers(request.headers());
        Self {
            request,
            jar,
            redirect: None,
            session: None,
        }
    }

    pub fn request(&self) -> &GateRequest {
        &self.request
    }

    /// Request cookies merged with cookies set or removed so far
    pub fn cookies(&self) -> &CookieJar {
        &self.jar
    }

    pub fn update_cookies(&mut self, update: impl FnOnce(CookieJar) -> CookieJar) {
        self.jar = update(self.jar.clone());
    }

    /// Record the redirect for this request. Only the first one is kept.
    pub fn issue_redirect(&mut self, target: impl Into<String>) {
        let target = target.into();
        match &self.redirect {
            Some(existing) => tracing::warn!(
                existing = %existing,
                ignored = %target,
                "Redirect already issued for this request"
            ),
            None => self.redirect = Some(target),
        }
    }

    pub fn redirect_target(&self) -> Option<&str> {
        self.redirect.as_deref()
    }

    pub fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn take_session(&mut self) -> Option<Session> {
        self.session.take()
    }

    /// Cookie changes plus the redirect, if one was issued
    pub fn into_response(self) -> Response {
        match self.redirect {
            Some(target) => (self.jar, Redirect::to(&target)).into_response(),
            None => self.jar.into_response(),
        }
    }
}
