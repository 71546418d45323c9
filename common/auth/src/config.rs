use std::time::Duration;

use jsonwebtoken::Algorithm;

const DEFAULT_JWKS_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime configuration for token verification against a single identity provider.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Identity-provider host, e.g. `tenant.auth0.com`.
    pub domain: String,
    /// Expected audience claim (aud).
    pub audience: String,
    /// Signature algorithms a token header may name.
    pub algorithms: Vec<Algorithm>,
    /// Allowable clock skew in seconds when validating exp/nbf.
    pub leeway_seconds: u32,
    /// Explicit key-set URL; derived from `domain` when unset.
    pub jwks_url: Option<String>,
    /// Upper bound on a single key-set fetch.
    pub jwks_timeout: Duration,
    /// Opt-in key-set cache lifetime. `None` fetches on every authorization.
    pub jwks_cache_ttl: Option<Duration>,
}

impl JwtConfig {
    /// Construct config for `domain` with RS256, no leeway, no cache and a 5 second fetch timeout.
    pub fn new(domain: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            audience: audience.into(),
            algorithms: vec![Algorithm::RS256],
            leeway_seconds: 0,
            jwks_url: None,
            jwks_timeout: DEFAULT_JWKS_TIMEOUT,
            jwks_cache_ttl: None,
        }
    }

    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Adjust the allowed leeway.
    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = Some(url.into());
        self
    }

    pub fn with_jwks_timeout(mut self, timeout: Duration) -> Self {
        self.jwks_timeout = timeout;
        self
    }

    pub fn with_jwks_cache_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_cache_ttl = Some(ttl);
        self
    }

    /// Issuer the tokens must carry: `https://{domain}/`.
    pub fn issuer(&self) -> String {
        format!("https://{}/", self.domain)
    }
}
