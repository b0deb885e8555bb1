//! Redirects issued by the gate
//!
//! The gate never builds responses itself. It asks a `RedirectCoordinator`
//! to send the browser to the success, failure or login target.

use axum_extra::extract::cookie::{Cookie, SameSite};

use super::exchange::GateExchange;

pub const SAVED_REQUEST_COOKIE: &str = "oauth1_saved_request";

/// Success, failure and login redirects
pub trait RedirectCoordinator: Send + Sync {
    /// Send the user back to where they were going before being gated
    fn issue_success_redirect(&self, exchange: &mut GateExchange);

    /// Send the user to the authentication failure page
    fn issue_failure_redirect(&self, exchange: &mut GateExchange, failure_url: &str);

    /// Remember the current URL for replay after login, then redirect to `login_url`
    fn save_request_and_redirect_to_login(&self, exchange: &mut GateExchange, login_url: &str);
}

/// Keeps the saved request in a short-lived cookie
pub struct CookieRedirectCoordinator {
    success_url: String,
    secure: bool,
}

impl CookieRedirectCoordinator {
    /// # Arguments
    /// * `success_url` - Target when no request was saved
    /// * `secure` - Mark the saved-request cookie `Secure`
    pub fn new(success_url: impl Into<String>, secure: bool) -> Self {
        Self {
            success_url: success_url.into(),
            secure,
        }
    }
}

/// Only same-origin paths that fit in a `Location` header are replayed
fn is_local_path(target: &str) -> bool {
    target.starts_with('/')
        && !target.starts_with("//")
        && !target.starts_with("/\\")
        && !target.chars().any(char::is_control)
}

impl RedirectCoordinator for CookieRedirectCoordinator {
    fn issue_success_redirect(&self, exchange: &mut GateExchange) {
        let saved = exchange
            .cookies()
            .get(SAVED_REQUEST_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|target| is_local_path(target));

        exchange.update_cookies(|jar| jar.remove(Cookie::build(SAVED_REQUEST_COOKIE).path("/")));

        let target = saved.unwrap_or_else(|| self.success_url.clone());
        exchange.issue_redirect(target);
    }

    fn issue_failure_redirect(&self, exchange: &mut GateExchange, failure_url: &str) {
        exchange.issue_redirect(failure_url);
    }

    fn save_request_and_redirect_to_login(&self, exchange: &mut GateExchange, login_url: &str) {
        let original = exchange.request().original_url();
        let cookie = Cookie::build((SAVED_REQUEST_COOKIE, original))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build();
        exchange.update_cookies(|jar| jar.add(cookie));
        exchange.issue_redirect(login_url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::exchange::GateRequest;
    use axum::http::{HeaderMap, HeaderValue, Uri, header};

    fn exchange(uri: &'static str, saved: Option<&str>) -> GateExchange {
        let mut headers = HeaderMap::new();
        if let Some(saved) = saved {
            let value = format!("{SAVED_REQUEST_COOKIE}={}", urlencoding::encode(saved));
            headers.insert("cookie", HeaderValue::from_str(&value).unwrap());
        }
        GateExchange::new(GateRequest::new(Uri::from_static(uri), headers))
    }

    #[test]
    fn login_redirect_saves_original_url() {
        let coordinator = CookieRedirectCoordinator::new("/", false);
        let mut exchange = exchange("/reports?page=2", None);

        coordinator.save_request_and_redirect_to_login(
            &mut exchange,
            "https://provider.example/oauth/authorize?oauth_token=rt",
        );

        assert_eq!(
            exchange.redirect_target(),
            Some("https://provider.example/oauth/authorize?oauth_token=rt")
        );
        let saved = exchange.cookies().get(SAVED_REQUEST_COOKIE).expect("saved cookie");
        assert_eq!(saved.value(), "/reports?page=2");
    }

    #[test]
    fn success_redirect_replays_saved_request() {
        let coordinator = CookieRedirectCoordinator::new("/", false);
        let mut exchange = exchange("/auth/oauth1/callback?code=abc", Some("/reports?page=2"));

        coordinator.issue_success_redirect(&mut exchange);

        assert_eq!(exchange.redirect_target(), Some("/reports?page=2"));
        assert!(exchange.cookies().get(SAVED_REQUEST_COOKIE).is_none());
    }

    #[test]
    fn saved_request_survives_cookie_round_trip() {
        let coordinator = CookieRedirectCoordinator::new("/", false);
        let original = "/search?q=a%26b&next=%2Fx";

        let mut start = GateExchange::new(GateRequest::new(
            Uri::from_static("/search?q=a%26b&next=%2Fx"),
            HeaderMap::new(),
        ));
        coordinator.save_request_and_redirect_to_login(&mut start, "/login");
        let response = start.into_response();

        // Send back exactly what the browser received
        let mut headers = HeaderMap::new();
        for set_cookie in response.headers().get_all(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
            headers.append(header::COOKIE, HeaderValue::from_str(pair).unwrap());
        }
        let mut callback = GateExchange::new(GateRequest::new(
            Uri::from_static("/auth/oauth1/callback?code=abc"),
            headers,
        ));

        coordinator.issue_success_redirect(&mut callback);

        assert_eq!(callback.redirect_target(), Some(original));
    }

    #[test]
    fn success_redirect_falls_back_without_saved_request() {
        let coordinator = CookieRedirectCoordinator::new("/home", false);
        let mut exchange = exchange("/auth/oauth1/callback?code=abc", None);

        coordinator.issue_success_redirect(&mut exchange);

        assert_eq!(exchange.redirect_target(), Some("/home"));
    }

    #[test]
    fn success_redirect_ignores_off_site_targets() {
        let coordinator = CookieRedirectCoordinator::new("/", false);

        for saved in [
            "https://evil.example/",
            "//evil.example/",
            "/\\evil.example",
            "/next\r\nSet-Cookie: admin=1",
        ] {
            let mut exchange = exchange("/auth/oauth1/callback?code=abc", Some(saved));
            coordinator.issue_success_redirect(&mut exchange);
            assert_eq!(exchange.redirect_target(), Some("/"), "saved target {saved}");
        }
    }

    #[test]
    fn failure_redirect_uses_given_url() {
        let coordinator = CookieRedirectCoordinator::new("/", false);
        let mut exchange = exchange("/auth/oauth1/callback?code=abc", None);

        coordinator.issue_failure_redirect(&mut exchange, "/auth/failure");

        assert_eq!(exchange.redirect_target(), Some("/auth/failure"));
    }
}
