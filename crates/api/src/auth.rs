//! Authorization seam.
//!
//! Token verification belongs to an external service; handlers only know
//! the `AccessVerifier` trait. `authorize_user` does the header plumbing
//! and defers the actual decision.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use tracing::warn;

const BEARER_SCHEME: &str = "bearer";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("missing or malformed authorization header")]
    MalformedHeader,
    #[error("access denied")]
    Denied,
}

/// Verifies that a bearer token grants the caller the right to act as
/// `wallet_address`. Implemented against the platform's auth service;
/// this crate ships only the seam and a permissive dev fallback.
#[async_trait]
pub trait AccessVerifier: Send + Sync {
    async fn verify(&self, token: &str, wallet_address: &str) -> Result<(), AccessDenied>;
}

/// Pull the bearer token out of the request headers and hand it to the
/// verifier.
pub async fn authorize_user(
    verifier: &dyn AccessVerifier,
    headers: &HeaderMap,
    wallet_address: &str,
) -> Result<(), AccessDenied> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AccessDenied::MalformedHeader)?;

    let mut parts = header.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();

    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) || token.is_empty() {
        return Err(AccessDenied::MalformedHeader);
    }

    verifier.verify(token, wallet_address).await
}

/// Admits any well-formed bearer token. Development only.
pub struct AllowAllVerifier;

impl AllowAllVerifier {
    pub fn new() -> Self {
        warn!("access verifier not configured; admitting any bearer token");
        Self
    }
}

impl Default for AllowAllVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccessVerifier for AllowAllVerifier {
    async fn verify(&self, _token: &str, _wallet_address: &str) -> Result<(), AccessDenied> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    struct RecordingVerifier;

    #[async_trait]
    impl AccessVerifier for RecordingVerifier {
        async fn verify(&self, token: &str, wallet_address: &str) -> Result<(), AccessDenied> {
            if token == "good-token" && wallet_address == "0xAAA" {
                Ok(())
            } else {
                Err(AccessDenied::Denied)
            }
        }
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[tokio::test]
    async fn well_formed_token_reaches_the_verifier() {
        let result =
            authorize_user(&RecordingVerifier, &headers_with("Bearer good-token"), "0xAAA").await;
        assert_eq!(result, Ok(()));

        let result =
            authorize_user(&RecordingVerifier, &headers_with("bearer good-token"), "0xAAA").await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn missing_or_malformed_headers_are_rejected_before_the_verifier() {
        let result = authorize_user(&RecordingVerifier, &HeaderMap::new(), "0xAAA").await;
        assert_eq!(result, Err(AccessDenied::MalformedHeader));

        let result =
            authorize_user(&RecordingVerifier, &headers_with("Basic abc"), "0xAAA").await;
        assert_eq!(result, Err(AccessDenied::MalformedHeader));

        let result = authorize_user(&RecordingVerifier, &headers_with("Bearer"), "0xAAA").await;
        assert_eq!(result, Err(AccessDenied::MalformedHeader));
    }

    #[tokio::test]
    async fn verifier_decision_is_propagated() {
        let result =
            authorize_user(&RecordingVerifier, &headers_with("Bearer bad-token"), "0xAAA").await;
        assert_eq!(result, Err(AccessDenied::Denied));
    }
}
