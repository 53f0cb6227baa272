//! Loopback identity client.
//!
//! # Responsibilities
//! - Hold the per-session HTTP client for the engine's local API
//! - Resolve a peer address to an identity record (`whois`)
//!
//! # Design Decisions
//! - One request per accepted connection, no retry or backoff
//! - Requests carry a deadline so a stuck local API cannot wedge accepts
//! - Environment proxies are ignored; the service is on loopback

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use url::Url;

use crate::error::{OverlayError, OverlayResult, WhoIsFailure};
use crate::identity::types::IdentityRecord;

/// Path of the identity lookup on the local API.
pub const WHOIS_PATH: &str = "/localapi/v0/whois";

/// Header the local API requires on every request.
pub const LOCALAPI_HEADER: HeaderName = HeaderName::from_static("sec-tailscale");
pub const LOCALAPI_HEADER_VALUE: &str = "localapi";

/// A secret issued by the engine. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// HTTP client bound to one session's loopback service.
#[derive(Clone)]
pub struct LoopbackIdentityClient {
    client: reqwest::Client,
    base_url: Url,
}

impl LoopbackIdentityClient {
    /// Build a client for the service at `address` (`host:port`).
    pub fn new(address: &str, credential: &Credential, timeout: Duration) -> OverlayResult<Self> {
        let base_url = Url::parse(&format!("http://{}", address)).map_err(|e| {
            OverlayError::Http(format!("invalid loopback address {:?}: {}", address, e))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(LOCALAPI_HEADER, HeaderValue::from_static(LOCALAPI_HEADER_VALUE));
        let token = BASE64_STANDARD.encode(format!(":{}", credential.expose()));
        let mut authorization = HeaderValue::from_str(&format!("Basic {}", token))
            .map_err(|e| OverlayError::Http(format!("invalid credential: {}", e)))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| OverlayError::Http(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The lookup URL for `address`, with the address percent-encoded.
    pub fn whois_url(&self, address: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(WHOIS_PATH);
        url.query_pairs_mut().clear().append_pair("addr", address);
        url
    }

    /// Resolve `address` to the identity of the peer behind it.
    pub async fn who_is(&self, address: &str) -> OverlayResult<IdentityRecord> {
        let failed = |reason| OverlayError::IdentityResolutionFailed {
            address: address.to_string(),
            reason,
        };

        let response = self
            .client
            .get(self.whois_url(address))
            .send()
            .await
            .map_err(|e| failed(WhoIsFailure::Transport(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(WhoIsFailure::Status(status.as_u16())));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| failed(WhoIsFailure::Transport(e.to_string())))?;
        let record: Option<IdentityRecord> = serde_json::from_slice(&body)
            .map_err(|e| failed(WhoIsFailure::Decode(e.to_string())))?;

        record.ok_or_else(|| failed(WhoIsFailure::Empty))
    }
}

impl std::fmt::Debug for LoopbackIdentityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackIdentityClient")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> LoopbackIdentityClient {
        LoopbackIdentityClient::new(
            "127.0.0.1:41112",
            &Credential::new("2b7e151628aed2a6abf7158809cf4f3c"),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn whois_url_encodes_ipv4_address() {
        let url = client().whois_url("100.101.102.103:50000");
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:41112/localapi/v0/whois?addr=100.101.102.103%3A50000"
        );
    }

    #[test]
    fn whois_url_encodes_ipv6_address() {
        let url = client().whois_url("[fd7a:115c:a1e0::1]:443");
        assert_eq!(url.query(), Some("addr=%5Bfd7a%3A115c%3Aa1e0%3A%3A1%5D%3A443"));
    }

    #[test]
    fn rejects_unparseable_address() {
        let err = LoopbackIdentityClient::new("not a host", &Credential::new("x"), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, OverlayError::Http(_)));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let cred = Credential::new("supersecret");
        assert_eq!(format!("{:?}", cred), "Credential(<redacted>)");
        assert_eq!(cred.expose(), "supersecret");
        assert!(!format!("{:?}", client()).contains("2b7e1516"));
    }
}
