use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderValue};

use crate::authorizer::{extract_bearer, TokenAuthorizer};
use crate::claims::Claims;
use crate::error::{AuthError, AuthResult, MalformedHeader};

/// Verified claims for the current request.
///
/// Reuses the context a [`crate::PermissionGuard`] already attached to the
/// request; otherwise authenticates the request without a specific permission.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
}

impl AuthContext {
    /// Run the full authorization pipeline against an `Authorization` header value.
    pub async fn authorize(
        authorizer: &TokenAuthorizer,
        header: Option<&HeaderValue>,
        permission: &str,
    ) -> AuthResult<Self> {
        let header_value = header
            .map(|value| {
                value
                    .to_str()
                    .map_err(|_| AuthError::HeaderMalformed(MalformedHeader::WrongScheme))
            })
            .transpose()?;

        let token = extract_bearer(header_value)?;
        let claims = authorizer.authorize_token(token, permission).await?;
        Ok(Self { claims })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<TokenAuthorizer>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(context) = parts.extensions.get::<AuthContext>() {
            return Ok(context.clone());
        }

        let authorizer = Arc::<TokenAuthorizer>::from_ref(state);
        AuthContext::authorize(&authorizer, parts.headers.get(AUTHORIZATION), "").await
    }
}
