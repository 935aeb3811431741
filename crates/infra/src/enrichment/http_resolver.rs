//! HTTP binding for the external name-lookup service.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{NameResolver, ResolveError};

#[derive(Serialize)]
struct ResolveRequest<'a> {
    wallet_address: &'a str,
}

#[derive(Deserialize)]
struct ResolveResponse {
    name: Option<String>,
}

/// Talks to a reverse-resolution endpoint over JSON.
///
/// The service contract is deliberately thin: POST the wallet address, get
/// back `{"name": "..."}` or an absent/empty name. Anything else (non-2xx,
/// timeouts, malformed bodies) is a `ResolveError` the enrichment handler
/// absorbs.
#[derive(Debug, Clone)]
pub struct HttpNameResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNameResolver {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResolveError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl NameResolver for HttpNameResolver {
    async fn resolve(&self, wallet_address: &str) -> Result<Option<String>, ResolveError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ResolveRequest { wallet_address })
            .send()
            .await
            .map_err(|e| ResolveError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ResolveError::Unavailable(format!(
                "resolver returned {}",
                response.status()
            )));
        }

        let body: ResolveResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::Malformed(e.to_string()))?;

        Ok(body.name.filter(|name| !name.is_empty()))
    }
}
