use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult, MalformedHeader};
use crate::jwks::{JwksFetcher, KeySet, KeySetProvider, SigningKey, StaticKeySetProvider};
use crate::key_cache::CachedKeySetProvider;
use crate::permissions::check_permission;

/// Pull the bearer token out of an `Authorization` header value.
pub fn extract_bearer(header: Option<&str>) -> AuthResult<&str> {
    let raw = header
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::HeaderMissing)?;

    let parts: Vec<&str> = raw.split_whitespace().collect();
    if !parts[0].eq_ignore_ascii_case("bearer") {
        return Err(AuthError::HeaderMalformed(MalformedHeader::WrongScheme));
    }
    match parts.as_slice() {
        [_, token] => Ok(*token),
        [_] => Err(AuthError::HeaderMalformed(MalformedHeader::MissingToken)),
        _ => Err(AuthError::HeaderMalformed(MalformedHeader::TooManyParts)),
    }
}

/// Token header fields read before the signature is checked. `alg` is left to
/// `decode`, so an unsupported algorithm surfaces after key selection.
#[derive(Deserialize)]
struct UnverifiedHeader {
    #[serde(default)]
    kid: Option<String>,
}

fn unverified_kid(token: &str) -> AuthResult<String> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header, _, _] = segments.as_slice() else {
        debug!(segments = segments.len(), "token is not a compact JWS");
        return Err(AuthError::MalformedToken);
    };
    let header: UnverifiedHeader = URL_SAFE_NO_PAD
        .decode(header.trim_end_matches('='))
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or_else(|| {
            debug!("token header undecodable");
            AuthError::MalformedToken
        })?;
    header.kid.ok_or(AuthError::MalformedToken)
}

/// Verifies bearer tokens against the identity provider's published keys and
/// enforces per-operation permissions.
///
/// Holds no per-request state; share it behind an `Arc`.
#[derive(Clone)]
pub struct TokenAuthorizer {
    config: JwtConfig,
    provider: Arc<dyn KeySetProvider>,
}

impl TokenAuthorizer {
    pub fn new(config: JwtConfig, provider: Arc<dyn KeySetProvider>) -> Self {
        Self { config, provider }
    }

    /// Build the HTTP key-set provider described by `config`.
    pub fn from_config(config: JwtConfig) -> Self {
        let mut fetcher = JwksFetcher::new().with_timeout(config.jwks_timeout);
        if let Some(url) = &config.jwks_url {
            fetcher = fetcher.with_url(url.clone());
        }
        let provider: Arc<dyn KeySetProvider> = match config.jwks_cache_ttl {
            Some(ttl) => Arc::new(CachedKeySetProvider::new(fetcher, ttl)),
            None => Arc::new(fetcher),
        };
        Self::new(config, provider)
    }

    pub fn with_static_keys(config: JwtConfig, keys: KeySet) -> Self {
        Self::new(config, Arc::new(StaticKeySetProvider::new(keys)))
    }

    /// Full pipeline for one request: extract, verify, check `permission`.
    pub async fn authorize(&self, header: Option<&str>, permission: &str) -> AuthResult<Claims> {
        let token = extract_bearer(header).inspect_err(|err| {
            debug!(code = err.code(), permission, "authorization header rejected");
        })?;
        self.authorize_token(token, permission).await
    }

    pub async fn authorize_token(&self, token: &str, permission: &str) -> AuthResult<Claims> {
        let claims = self.verify(token).await?;
        check_permission(&claims, permission)?;
        Ok(claims)
    }

    /// Select the signing key named by the token and validate signature, expiry, audience and issuer.
    pub async fn verify(&self, token: &str) -> AuthResult<Claims> {
        let key = self.select_key(token).await.inspect_err(|err| {
            debug!(code = err.code(), "signing key selection failed");
        })?;

        let decoding_key = key.decoding_key()?;
        let token_data = decode::<Value>(token, &decoding_key, &self.validation())
            .map_err(AuthError::from)
            .inspect_err(|err| {
                debug!(kid = %key.key_id, code = err.code(), error = %err, "token rejected");
            })?;
        let claims = Claims::try_from(token_data.claims)?;
        debug!(kid = %key.key_id, subject = ?claims.subject, "verified JWT successfully");
        Ok(claims)
    }

    async fn select_key(&self, token: &str) -> AuthResult<SigningKey> {
        let kid = unverified_kid(token)?;

        let keys = self.provider.fetch_key_set(&self.config.domain).await?;
        if let Some(key) = keys.find(&kid) {
            return Ok(key.clone());
        }

        if self.provider.is_cached() {
            debug!(kid = %kid, "kid absent from cached JWKS, refreshing");
            let keys = self.provider.refresh_key_set(&self.config.domain).await?;
            if let Some(key) = keys.find(&kid) {
                return Ok(key.clone());
            }
        }

        Err(AuthError::KeyNotFound(kid))
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.algorithms = self.config.algorithms.clone();
        validation.set_issuer(&[self.config.issuer()]);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "aud", "iss"]);
        validation.leeway = self.config.leeway_seconds.into();
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use once_cell::sync::Lazy;
    use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
    use rsa::rand_core::OsRng;
    use rsa::traits::PublicKeyParts;
    use rsa::RsaPrivateKey;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const DOMAIN: &str = "coffee.example.com";
    const ISSUER: &str = "https://coffee.example.com/";
    const AUDIENCE: &str = "drinks";
    const KID: &str = "primary";

    struct KeyMaterial {
        encoding: EncodingKey,
        modulus: String,
        exponent: String,
    }

    impl KeyMaterial {
        fn signing_key(&self, kid: &str) -> SigningKey {
            SigningKey {
                key_id: kid.to_string(),
                key_type: "RSA".to_string(),
                usage: "sig".to_string(),
                modulus: self.modulus.clone(),
                exponent: self.exponent.clone(),
            }
        }
    }

    fn generate_key_material() -> KeyMaterial {
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
        let public_key = private_key.to_public_key();
        let private_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .expect("private pem");

        KeyMaterial {
            encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("encoding key"),
            modulus: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            exponent: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    }

    static PRIMARY: Lazy<KeyMaterial> = Lazy::new(generate_key_material);
    static IMPOSTOR: Lazy<KeyMaterial> = Lazy::new(generate_key_material);

    fn payload(permissions: Option<Vec<&str>>) -> Value {
        let now = Utc::now().timestamp();
        let mut claims = json!({
            "iss": ISSUER,
            "sub": "auth0|manager",
            "aud": AUDIENCE,
            "iat": now,
            "exp": now + 600,
        });
        if let Some(permissions) = permissions {
            claims["permissions"] = json!(permissions);
        }
        claims
    }

    fn sign(material: &KeyMaterial, kid: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_string);
        encode(&header, claims, &material.encoding).expect("sign token")
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    #[derive(Default)]
    struct CountingProvider {
        keys: KeySet,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl KeySetProvider for CountingProvider {
        async fn fetch_key_set(&self, domain: &str) -> AuthResult<KeySet> {
            assert_eq!(domain, DOMAIN);
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AuthError::KeySetUnavailable("connection refused".into()));
            }
            Ok(self.keys.clone())
        }
    }

    fn authorizer_with(provider: Arc<CountingProvider>) -> TokenAuthorizer {
        TokenAuthorizer::new(JwtConfig::new(DOMAIN, AUDIENCE), provider)
    }

    fn published() -> Arc<CountingProvider> {
        Arc::new(CountingProvider {
            keys: KeySet::new(vec![PRIMARY.signing_key(KID)]),
            ..Default::default()
        })
    }

    #[test]
    fn extract_bearer_accepts_valid_header() {
        assert_eq!(extract_bearer(Some("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
        assert_eq!(extract_bearer(Some("bEaReR   abc.def.ghi ")).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn extract_bearer_classifies_bad_headers() {
        assert!(matches!(extract_bearer(None), Err(AuthError::HeaderMissing)));
        assert!(matches!(extract_bearer(Some("")), Err(AuthError::HeaderMissing)));
        assert!(matches!(extract_bearer(Some("   ")), Err(AuthError::HeaderMissing)));
        assert!(matches!(
            extract_bearer(Some("Basic dXNlcjpwYXNz")),
            Err(AuthError::HeaderMalformed(MalformedHeader::WrongScheme))
        ));
        assert!(matches!(
            extract_bearer(Some("Bearer")),
            Err(AuthError::HeaderMalformed(MalformedHeader::MissingToken))
        ));
        assert!(matches!(
            extract_bearer(Some("Bearer a b")),
            Err(AuthError::HeaderMalformed(MalformedHeader::TooManyParts))
        ));
    }

    #[tokio::test]
    async fn bad_headers_never_reach_key_lookup() {
        let provider = published();
        let authorizer = authorizer_with(provider.clone());

        for header in [None, Some(""), Some("Token abc"), Some("Bearer"), Some("Bearer a b")] {
            let err = authorizer
                .authorize(header, "post:drinks")
                .await
                .expect_err("header rejected");
            assert!(
                matches!(err, AuthError::HeaderMissing | AuthError::HeaderMalformed(_)),
                "unexpected error for {header:?}: {err:?}"
            );
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn token_without_kid_is_malformed() {
        let authorizer = authorizer_with(published());
        let token = sign(&PRIMARY, None, &payload(Some(vec!["post:drinks"])));

        let err = authorizer
            .authorize(Some(&bearer(&token)), "post:drinks")
            .await
            .expect_err("no kid");
        assert!(matches!(err, AuthError::MalformedToken));
    }

    #[tokio::test]
    async fn garbage_token_is_malformed() {
        let authorizer = authorizer_with(published());
        let err = authorizer
            .authorize(Some("Bearer not-a-jwt"), "post:drinks")
            .await
            .expect_err("garbage");
        assert!(matches!(err, AuthError::MalformedToken));
    }

    #[tokio::test]
    async fn unknown_kid_is_key_not_found() {
        let authorizer = authorizer_with(published());
        let token = sign(&PRIMARY, Some("rotated-away"), &payload(Some(vec!["post:drinks"])));

        match authorizer.authorize(Some(&bearer(&token)), "post:drinks").await {
            Err(AuthError::KeyNotFound(kid)) => assert_eq!(kid, "rotated-away"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let authorizer = authorizer_with(published());
        let mut claims = payload(Some(vec!["post:drinks"]));
        claims["exp"] = json!(Utc::now().timestamp() - 3600);
        let token = sign(&PRIMARY, Some(KID), &claims);

        let err = authorizer
            .authorize(Some(&bearer(&token)), "post:drinks")
            .await
            .expect_err("expired");
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn wrong_audience_or_issuer_is_invalid_claims() {
        let authorizer = authorizer_with(published());

        let mut wrong_aud = payload(Some(vec!["post:drinks"]));
        wrong_aud["aud"] = json!("someone-else");
        let token = sign(&PRIMARY, Some(KID), &wrong_aud);
        let err = authorizer.authorize(Some(&bearer(&token)), "post:drinks").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidClaims(_)), "{err:?}");

        let mut wrong_iss = payload(Some(vec!["post:drinks"]));
        wrong_iss["iss"] = json!("https://evil.example.com/");
        let token = sign(&PRIMARY, Some(KID), &wrong_iss);
        let err = authorizer.authorize(Some(&bearer(&token)), "post:drinks").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidClaims(_)), "{err:?}");
    }

    #[tokio::test]
    async fn missing_audience_is_invalid_claims() {
        let authorizer = authorizer_with(published());
        let mut claims = payload(Some(vec!["post:drinks"]));
        claims.as_object_mut().unwrap().remove("aud");
        let token = sign(&PRIMARY, Some(KID), &claims);

        let err = authorizer.authorize(Some(&bearer(&token)), "post:drinks").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidClaims(_)), "{err:?}");
    }

    #[tokio::test]
    async fn forged_signature_is_unparseable() {
        let authorizer = authorizer_with(published());
        let token = sign(&IMPOSTOR, Some(KID), &payload(Some(vec!["post:drinks"])));

        let err = authorizer.authorize(Some(&bearer(&token)), "post:drinks").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenUnparseable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn disallowed_algorithm_is_unparseable() {
        let authorizer = authorizer_with(published());
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(KID.to_string());
        let token = encode(
            &header,
            &payload(Some(vec!["post:drinks"])),
            &EncodingKey::from_secret(b"shared"),
        )
        .unwrap();

        let err = authorizer.authorize(Some(&bearer(&token)), "post:drinks").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenUnparseable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn unknown_algorithm_is_unparseable_after_key_selection() {
        let provider = published();
        let authorizer = authorizer_with(provider.clone());
        let header = URL_SAFE_NO_PAD.encode(json!({"alg": "none", "typ": "JWT", "kid": KID}).to_string());
        let claims = URL_SAFE_NO_PAD.encode(payload(Some(vec!["post:drinks"])).to_string());
        let token = format!("{header}.{claims}.");

        let err = authorizer.authorize(Some(&bearer(&token)), "post:drinks").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenUnparseable(_)), "{err:?}");
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn undecodable_header_segment_is_malformed() {
        let provider = published();
        let authorizer = authorizer_with(provider.clone());

        for token in ["%%%.e30.sig", "e30.e30", "a.b.c.d"] {
            let err = authorizer.authorize(Some(&bearer(token)), "post:drinks").await.unwrap_err();
            assert!(matches!(err, AuthError::MalformedToken), "{token}: {err:?}");
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_permissions_claim_is_reported() {
        let authorizer = authorizer_with(published());
        let token = sign(&PRIMARY, Some(KID), &payload(None));

        let err = authorizer.authorize(Some(&bearer(&token)), "post:drinks").await.unwrap_err();
        assert!(matches!(err, AuthError::PermissionsClaimMissing));
    }

    #[tokio::test]
    async fn wrong_permission_is_denied() {
        let authorizer = authorizer_with(published());
        let token = sign(&PRIMARY, Some(KID), &payload(Some(vec!["get:drinks-detail"])));

        let err = authorizer.authorize(Some(&bearer(&token)), "post:drinks").await.unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn matching_permission_returns_claims() {
        let authorizer = authorizer_with(published());
        let token = sign(&PRIMARY, Some(KID), &payload(Some(vec!["post:drinks"])));

        let claims = authorizer
            .authorize(Some(&bearer(&token)), "post:drinks")
            .await
            .expect("authorized");
        assert_eq!(claims.permissions, Some(vec!["post:drinks".to_string()]));
        assert_eq!(claims.issuer, ISSUER);
        assert_eq!(claims.audience, vec![AUDIENCE.to_string()]);
        assert_eq!(claims.subject.as_deref(), Some("auth0|manager"));
    }

    #[tokio::test]
    async fn repeated_authorization_is_idempotent() {
        let provider = published();
        let authorizer = authorizer_with(provider.clone());
        let granted = sign(&PRIMARY, Some(KID), &payload(Some(vec!["post:drinks"])));
        let denied = sign(&PRIMARY, Some(KID), &payload(Some(vec!["get:drinks-detail"])));

        for _ in 0..2 {
            assert!(authorizer.authorize(Some(&bearer(&granted)), "post:drinks").await.is_ok());
            assert!(matches!(
                authorizer.authorize(Some(&bearer(&denied)), "post:drinks").await,
                Err(AuthError::PermissionDenied(_))
            ));
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn provider_failure_is_key_set_unavailable() {
        let provider = Arc::new(CountingProvider { fail: true, ..Default::default() });
        let authorizer = authorizer_with(provider.clone());
        let token = sign(&PRIMARY, Some(KID), &payload(Some(vec!["post:drinks"])));

        let err = authorizer.authorize(Some(&bearer(&token)), "post:drinks").await.unwrap_err();
        assert!(matches!(err, AuthError::KeySetUnavailable(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn leeway_admits_recently_expired_tokens() {
        let config = JwtConfig::new(DOMAIN, AUDIENCE).with_leeway(120);
        let authorizer = TokenAuthorizer::new(config, published());
        let mut claims = payload(Some(vec!["post:drinks"]));
        claims["exp"] = json!(Utc::now().timestamp() - 30);
        let token = sign(&PRIMARY, Some(KID), &claims);

        authorizer
            .authorize(Some(&bearer(&token)), "post:drinks")
            .await
            .expect("within leeway");
    }

    #[tokio::test]
    async fn empty_permission_authenticates_only() {
        let authorizer = authorizer_with(published());
        let token = sign(&PRIMARY, Some(KID), &payload(Some(vec![])));

        authorizer
            .authorize(Some(&bearer(&token)), "")
            .await
            .expect("authentication only");
    }

    #[tokio::test]
    async fn cached_provider_refreshes_on_unknown_kid() {
        struct Rotating {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl KeySetProvider for Rotating {
            async fn fetch_key_set(&self, _domain: &str) -> AuthResult<KeySet> {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                let kid = if call == 0 { "old" } else { KID };
                Ok(KeySet::new(vec![PRIMARY.signing_key(kid)]))
            }
        }

        let cache = CachedKeySetProvider::new(Rotating { calls: AtomicUsize::new(0) }, Duration::from_secs(300))
            .with_min_refresh_interval(Duration::ZERO);
        let authorizer = TokenAuthorizer::new(JwtConfig::new(DOMAIN, AUDIENCE), Arc::new(cache));
        let token = sign(&PRIMARY, Some(KID), &payload(Some(vec!["post:drinks"])));

        authorizer
            .authorize(Some(&bearer(&token)), "post:drinks")
            .await
            .expect("rotated key picked up");
    }
}
