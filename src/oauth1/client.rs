//! reqwest-backed OAuth1 client
//!
//! Performs the request-token and access-token round trips against the
//! configured provider endpoints, signing each request with the consumer
//! credentials.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::async_trait;
use rand::{Rng, distributions::Alphanumeric};
use reqwest::header::AUTHORIZATION;
use url::Url;

use super::signature::{self, SignatureMethod};
use super::{AccessToken, OAuth1Client, RequestToken};
use crate::config::ProviderConfig;
use crate::error::{AppError, ProviderError};
use crate::metrics::{PROVIDER_REQUEST_DURATION_SECONDS, PROVIDER_REQUESTS_TOTAL};

const NONCE_LENGTH: usize = 32;
const MAX_LOGGED_BODY: usize = 200;

/// OAuth 1.0a client talking to a provider over HTTP
pub struct HttpOAuth1Client {
    http_client: Arc<reqwest::Client>,
    consumer_key: String,
    consumer_secret: String,
    request_token_url: Url,
    access_token_url: Url,
    authorize_url: Url,
    callback_url: String,
    signature_method: SignatureMethod,
}

impl HttpOAuth1Client {
    /// Create client from provider configuration
    ///
    /// The timeout configured on `http_client` bounds each round trip.
    ///
    /// # Errors
    /// Returns `AppError::Config` if an endpoint is not a valid URL
    pub fn new(config: &ProviderConfig, http_client: Arc<reqwest::Client>) -> Result<Self, AppError> {
        let parse = |key: &str, value: &str| {
            Url::parse(value).map_err(|e| AppError::Config(format!("{key}: {e}")))
        };

        Ok(Self {
            http_client,
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            request_token_url: parse("provider.request_token_url", &config.request_token_url)?,
            access_token_url: parse("provider.access_token_url", &config.access_token_url)?,
            authorize_url: parse("provider.authorize_url", &config.authorize_url)?,
            callback_url: config.callback_url.clone(),
            signature_method: config.signature_method,
        })
    }

    fn nonce() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LENGTH)
            .map(char::from)
            .collect()
    }

    /// Sign and POST an empty-bodied request, returning the form-encoded response fields
    async fn signed_post(
        &self,
        call: &'static str,
        url: &Url,
        token: Option<(&str, &str)>,
        extra: &[(&str, &str)],
    ) -> Result<HashMap<String, String>, ProviderError> {
        let mut params: Vec<(String, String)> = vec![
            ("oauth_consumer_key".into(), self.consumer_key.clone()),
            ("oauth_nonce".into(), Self::nonce()),
            (
                "oauth_signature_method".into(),
                self.signature_method.as_str().into(),
            ),
            (
                "oauth_timestamp".into(),
                chrono::Utc::now().timestamp().to_string(),
            ),
            ("oauth_version".into(), "1.0".into()),
        ];
        if let Some((token, _)) = token {
            params.push(("oauth_token".into(), token.to_string()));
        }
        params.extend(
            extra
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string())),
        );

        let base_string = signature::signature_base_string("POST", url, &params);
        let token_secret = token.map(|(_, secret)| secret).unwrap_or_default();
        let oauth_signature = signature::sign(
            self.signature_method,
            &base_string,
            &self.consumer_secret,
            token_secret,
        )?;
        params.push(("oauth_signature".into(), oauth_signature));

        let started = Instant::now();
        let result = self
            .http_client
            .post(url.clone())
            .header(AUTHORIZATION, signature::authorization_header(&params))
            .send()
            .await;
        PROVIDER_REQUEST_DURATION_SECONDS
            .with_label_values(&[call])
            .observe(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                PROVIDER_REQUESTS_TOTAL
                    .with_label_values(&[call, "transport_error"])
                    .inc();
                return Err(e.into());
            }
        };

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            PROVIDER_REQUESTS_TOTAL
                .with_label_values(&[call, "rejected"])
                .inc();
            let excerpt: String = body.chars().take(MAX_LOGGED_BODY).collect();
            return Err(ProviderError::Protocol(format!(
                "{call} returned {status}: {excerpt}"
            )));
        }

        PROVIDER_REQUESTS_TOTAL.with_label_values(&[call, "ok"]).inc();

        Ok(url::form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect())
    }
}

fn required_field(
    fields: &mut HashMap<String, String>,
    name: &str,
    call: &str,
) -> Result<String, ProviderError> {
    fields
        .remove(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ProviderError::Protocol(format!("{call} response is missing `{name}`")))
}

#[async_trait]
impl OAuth1Client for HttpOAuth1Client {
    async fn request_token(&self) -> Result<RequestToken, ProviderError> {
        let mut fields = self
            .signed_post(
                "request_token",
                &self.request_token_url,
                None,
                &[("oauth_callback", self.callback_url.as_str())],
            )
            .await?;

        let token = required_field(&mut fields, "oauth_token", "request_token")?;
        let secret = required_field(&mut fields, "oauth_token_secret", "request_token")?;
        let callback_confirmed = fields
            .get("oauth_callback_confirmed")
            .is_some_and(|value| value == "true");

        if !callback_confirmed {
            return Err(ProviderError::Protocol(
                "request_token response did not confirm oauth_callback".to_string(),
            ));
        }

        tracing::debug!(token = %token, "Obtained request token");

        Ok(RequestToken {
            token,
            secret,
            callback_confirmed,
        })
    }

    async fn access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> Result<AccessToken, ProviderError> {
        let mut fields = self
            .signed_post(
                "access_token",
                &self.access_token_url,
                Some((&request_token.token, &request_token.secret)),
                &[("oauth_verifier", verifier)],
            )
            .await?;

        let token = required_field(&mut fields, "oauth_token", "access_token")?;
        let secret = required_field(&mut fields, "oauth_token_secret", "access_token")?;

        Ok(AccessToken {
            token,
            secret,
            parameters: fields.into_iter().collect(),
        })
    }

    fn authorization_url(&self, request_token: &RequestToken) -> String {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("oauth_token", &request_token.token);
        url.into()
    }
}
