use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// One published public signing key, as it appears in a JWKS document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
    #[serde(rename = "kid")]
    pub key_id: String,
    #[serde(rename = "kty")]
    pub key_type: String,
    #[serde(rename = "use")]
    pub usage: String,
    #[serde(rename = "n")]
    pub modulus: String,
    #[serde(rename = "e")]
    pub exponent: String,
}

impl SigningKey {
    /// Build the RSA verification key from the base64url modulus and exponent.
    pub fn decoding_key(&self) -> AuthResult<DecodingKey> {
        if self.key_type != "RSA" {
            return Err(AuthError::TokenUnparseable(format!(
                "key '{}' has unsupported type '{}'",
                self.key_id, self.key_type
            )));
        }
        DecodingKey::from_rsa_components(&self.modulus, &self.exponent).map_err(|err| {
            AuthError::TokenUnparseable(format!("key '{}' is unusable: {err}", self.key_id))
        })
    }
}

/// Ordered set of signing keys. Lookups return the first key with a matching id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    pub keys: Vec<SigningKey>,
}

impl KeySet {
    pub fn new(keys: Vec<SigningKey>) -> Self {
        Self { keys }
    }

    pub fn find(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.iter().find(|key| key.key_id == kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Source of the identity provider's published signing keys.
#[async_trait]
pub trait KeySetProvider: Send + Sync {
    async fn fetch_key_set(&self, domain: &str) -> AuthResult<KeySet>;

    /// Fetch while bypassing any cached copy.
    async fn refresh_key_set(&self, domain: &str) -> AuthResult<KeySet> {
        self.fetch_key_set(domain).await
    }

    /// Whether `fetch_key_set` may answer from a previously fetched set.
    fn is_cached(&self) -> bool {
        false
    }
}

/// Fetches `https://{domain}/.well-known/jwks.json` on every call.
#[derive(Clone)]
pub struct JwksFetcher {
    client: Client,
    url: Option<String>,
    timeout: Duration,
}

impl JwksFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Fetch from a fixed URL instead of the domain's well-known location.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url_for(&self, domain: &str) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("https://{domain}/.well-known/jwks.json"),
        }
    }
}

impl Default for JwksFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeySetProvider for JwksFetcher {
    async fn fetch_key_set(&self, domain: &str) -> AuthResult<KeySet> {
        let url = self.url_for(domain);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| {
                let detail = if err.is_timeout() {
                    format!("timed out after {:?} fetching {url}", self.timeout)
                } else {
                    err.to_string()
                };
                warn!(url = %url, error = %detail, "JWKS request failed");
                AuthError::KeySetUnavailable(detail)
            })?;

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "JWKS endpoint returned an error status");
            return Err(AuthError::KeySetUnavailable(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }

        let keys: KeySet = response.json().await.map_err(|err| {
            warn!(url = %url, error = %err, "JWKS payload rejected");
            AuthError::KeySetUnavailable(format!("malformed JWKS from {url}: {err}"))
        })?;

        if keys.is_empty() {
            warn!(url = %url, "JWKS contains no signing keys");
        } else {
            debug!(url = %url, keys = keys.len(), "fetched JWKS");
        }
        Ok(keys)
    }
}

/// Serves a fixed key set regardless of domain.
#[derive(Debug, Clone, Default)]
pub struct StaticKeySetProvider {
    keys: KeySet,
}

impl StaticKeySetProvider {
    pub fn new(keys: KeySet) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl KeySetProvider for StaticKeySetProvider {
    async fn fetch_key_set(&self, _domain: &str) -> AuthResult<KeySet> {
        Ok(self.keys.clone())
    }
}
