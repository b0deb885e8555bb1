//! OAuth 1.0a request signing
//!
//! Implements the signature base string, parameter normalization and
//! signature methods per RFC 5849 §3.4, plus the `Authorization: OAuth`
//! header encoding from §3.5.1.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use url::Url;

use crate::error::ProviderError;

/// Supported `oauth_signature_method` values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SignatureMethod {
    #[default]
    #[serde(rename = "HMAC-SHA1")]
    HmacSha1,
    #[serde(rename = "HMAC-SHA256")]
    HmacSha256,
    #[serde(rename = "PLAINTEXT")]
    Plaintext,
}

impl SignatureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureMethod::HmacSha1 => "HMAC-SHA1",
            SignatureMethod::HmacSha256 => "HMAC-SHA256",
            SignatureMethod::Plaintext => "PLAINTEXT",
        }
    }
}

/// Percent-encode per RFC 5849 §3.6 (everything but `ALPHA / DIGIT / - . _ ~`)
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Base string URI: scheme and host lowercased, default port dropped, no query
fn base_string_uri(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}

/// Encode, sort by name then value, and join as `name=value&...`
fn normalize_parameters(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(name, value)| (percent_encode(name), percent_encode(value)))
        .collect();
    encoded.sort();

    encoded
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the signature base string
///
/// `params` holds the `oauth_*` protocol parameters (without `oauth_signature`)
/// and any form body parameters. Query parameters are read from `url`.
pub fn signature_base_string(method: &str, url: &Url, params: &[(String, String)]) -> String {
    let mut all: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    all.extend(params.iter().cloned());

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(&base_string_uri(url)),
        percent_encode(&normalize_parameters(&all))
    )
}

/// Compute `oauth_signature` for a base string
pub fn sign(
    method: SignatureMethod,
    base_string: &str,
    consumer_secret: &str,
    token_secret: &str,
) -> Result<String, ProviderError> {
    let key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );

    match method {
        SignatureMethod::HmacSha1 => {
            let mut mac = Hmac::<sha1::Sha1>::new_from_slice(key.as_bytes())
                .map_err(|e| ProviderError::Signing(e.to_string()))?;
            mac.update(base_string.as_bytes());
            Ok(BASE64.encode(mac.finalize().into_bytes()))
        }
        SignatureMethod::HmacSha256 => {
            let mut mac = Hmac::<sha2::Sha256>::new_from_slice(key.as_bytes())
                .map_err(|e| ProviderError::Signing(e.to_string()))?;
            mac.update(base_string.as_bytes());
            Ok(BASE64.encode(mac.finalize().into_bytes()))
        }
        SignatureMethod::Plaintext => Ok(key),
    }
}

/// Render protocol parameters as an `Authorization` header value
pub fn authorization_header(params: &[(String, String)]) -> String {
    let fields = params
        .iter()
        .map(|(name, value)| format!("{}=\"{}\"", percent_encode(name), percent_encode(value)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {fields}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(values: &[(&str, &str)]) -> Vec<(String, String)> {
        values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // Worked example from Twitter's "Creating a signature" guide.
    fn twitter_example() -> (Url, Vec<(String, String)>) {
        let url = Url::parse("https://api.twitter.com/1.1/statuses/update.json?include_entities=true")
            .expect("valid url");
        let params = pairs(&[
            ("status", "Hello Ladies + Gentlemen, a signed OAuth request!"),
            ("oauth_consumer_key", "xvz1evFS4wEEPTGEFPHBog"),
            ("oauth_nonce", "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", "1318622958"),
            (
                "oauth_token",
                "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
            ),
            ("oauth_version", "1.0"),
        ]);
        (url, params)
    }

    #[test]
    fn base_string_matches_reference_example() {
        let (url, params) = twitter_example();
        let base = signature_base_string("post", &url, &params);

        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&include_entities%3Dtrue%26oauth_consumer_key%3Dxvz1evFS4wEEPTGEFPHBog%26oauth_nonce%3DkYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg%26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1318622958%26oauth_token%3D370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb%26oauth_version%3D1.0%26status%3DHello%2520Ladies%2520%252B%2520Gentlemen%252C%2520a%2520signed%2520OAuth%2520request%2521"
        );
    }

    #[test]
    fn hmac_sha1_signature_matches_reference_example() {
        let (url, params) = twitter_example();
        let base = signature_base_string("POST", &url, &params);

        let signature = sign(
            SignatureMethod::HmacSha1,
            &base,
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
        )
        .expect("signing succeeds");

        assert_eq!(signature, "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
    }

    #[test]
    fn plaintext_signature_is_encoded_key() {
        let signature = sign(SignatureMethod::Plaintext, "ignored", "cs&1", "").expect("plaintext");
        assert_eq!(signature, "cs%261&");
    }

    #[test]
    fn base_string_uri_keeps_non_default_port_only() {
        let default_port = Url::parse("HTTPS://Provider.Example:443/oauth/request_token").unwrap();
        let custom_port = Url::parse("http://127.0.0.1:9000/oauth/request_token").unwrap();

        assert_eq!(
            base_string_uri(&default_port),
            "https://provider.example/oauth/request_token"
        );
        assert_eq!(
            base_string_uri(&custom_port),
            "http://127.0.0.1:9000/oauth/request_token"
        );
    }

    #[test]
    fn authorization_header_quotes_and_encodes_values() {
        let header = authorization_header(&pairs(&[
            ("oauth_callback", "http://localhost/cb?x=1"),
            ("oauth_version", "1.0"),
        ]));
        assert_eq!(
            header,
            "OAuth oauth_callback=\"http%3A%2F%2Flocalhost%2Fcb%3Fx%3D1\", oauth_version=\"1.0\""
        );
    }

    #[test]
    fn signature_method_deserializes_from_wire_names() {
        let method: SignatureMethod = serde_json::from_str("\"HMAC-SHA256\"").unwrap();
        assert_eq!(method, SignatureMethod::HmacSha256);
        assert_eq!(method.as_str(), "HMAC-SHA256");
    }
}
