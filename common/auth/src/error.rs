use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::errors::ErrorKind;
use serde::Serialize;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Why an `Authorization` header value could not be turned into a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedHeader {
    WrongScheme,
    MissingToken,
    TooManyParts,
}

impl MalformedHeader {
    pub fn description(&self) -> &'static str {
        match self {
            MalformedHeader::WrongScheme => "Authorization header must start with \"Bearer\".",
            MalformedHeader::MissingToken => "Token not found.",
            MalformedHeader::TooManyParts => "Authorization header must be bearer token.",
        }
    }
}

/// Terminal failure of one authorization attempt.
///
/// Each variant maps to a stable `(code, description, status)` triple; the
/// payloads only carry detail for logs and are never rendered to clients.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header missing")]
    HeaderMissing,
    #[error("authorization header malformed: {}", .0.description())]
    HeaderMalformed(MalformedHeader),
    #[error("token header does not name a key id")]
    MalformedToken,
    #[error("signing key set unavailable: {0}")]
    KeySetUnavailable(String),
    #[error("no signing key published for kid '{0}'")]
    KeyNotFound(String),
    #[error("token expired")]
    TokenExpired,
    #[error("token claims rejected: {0}")]
    InvalidClaims(String),
    #[error("token could not be decoded: {0}")]
    TokenUnparseable(String),
    #[error("token carries no permissions claim")]
    PermissionsClaimMissing,
    #[error("permission '{0}' not granted")]
    PermissionDenied(String),
}

impl AuthError {
    /// Machine-readable code, also sent as the `X-Error-Code` header.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::HeaderMissing => "authorization_header_missing",
            AuthError::HeaderMalformed(_) => "invalid_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::KeySetUnavailable(_) => "key_set_unavailable",
            AuthError::KeyNotFound(_) => "key_not_found",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidClaims(_) => "invalid_claims",
            AuthError::TokenUnparseable(_) => "token_unparseable",
            AuthError::PermissionsClaimMissing => "permissions_claim_missing",
            AuthError::PermissionDenied(_) => "permission_denied",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AuthError::HeaderMissing => "Authorization header is expected.",
            AuthError::HeaderMalformed(reason) => reason.description(),
            AuthError::MalformedToken => "Authorization malformed.",
            AuthError::KeySetUnavailable(_) => "Unable to retrieve signing keys.",
            AuthError::KeyNotFound(_) => "Unable to find the appropriate key.",
            AuthError::TokenExpired => "Token expired.",
            AuthError::InvalidClaims(_) => {
                "Incorrect claims. Please, check the audience and issuer."
            }
            AuthError::TokenUnparseable(_) => "Unable to parse authentication token.",
            AuthError::PermissionsClaimMissing => "Permissions not included in JWT.",
            AuthError::PermissionDenied(_) => "Permission not found in JWT.",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::HeaderMissing
            | AuthError::HeaderMalformed(_)
            | AuthError::MalformedToken
            | AuthError::TokenExpired
            | AuthError::InvalidClaims(_) => StatusCode::UNAUTHORIZED,
            AuthError::KeyNotFound(_)
            | AuthError::TokenUnparseable(_)
            | AuthError::PermissionsClaimMissing => StatusCode::BAD_REQUEST,
            AuthError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AuthError::KeySetUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::InvalidClaims(value.to_string()),
            _ => Self::TokenUnparseable(value.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: u16,
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            success: false,
            error: status.as_u16(),
            message: self.description(),
        };
        let mut resp = (status, Json(body)).into_response();
        resp.headers_mut()
            .insert("X-Error-Code", HeaderValue::from_static(self.code()));
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn status_table_matches_taxonomy() {
        let cases = [
            (AuthError::HeaderMissing, StatusCode::UNAUTHORIZED),
            (
                AuthError::HeaderMalformed(MalformedHeader::WrongScheme),
                StatusCode::UNAUTHORIZED,
            ),
            (AuthError::MalformedToken, StatusCode::UNAUTHORIZED),
            (
                AuthError::KeySetUnavailable("timeout".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (AuthError::KeyNotFound("k".into()), StatusCode::BAD_REQUEST),
            (AuthError::TokenExpired, StatusCode::UNAUTHORIZED),
            (AuthError::InvalidClaims("aud".into()), StatusCode::UNAUTHORIZED),
            (AuthError::TokenUnparseable("sig".into()), StatusCode::BAD_REQUEST),
            (AuthError::PermissionsClaimMissing, StatusCode::BAD_REQUEST),
            (AuthError::PermissionDenied("post:drinks".into()), StatusCode::FORBIDDEN),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{}", err.code());
        }
    }

    #[test]
    fn jsonwebtoken_kinds_are_classified() {
        let expired: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::ExpiredSignature).into();
        assert!(matches!(expired, AuthError::TokenExpired));

        let audience: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidAudience).into();
        assert!(matches!(audience, AuthError::InvalidClaims(_)));

        let issuer: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidIssuer).into();
        assert!(matches!(issuer, AuthError::InvalidClaims(_)));

        let signature: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidSignature).into();
        assert!(matches!(signature, AuthError::TokenUnparseable(_)));

        let algorithm: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidAlgorithm).into();
        assert!(matches!(algorithm, AuthError::TokenUnparseable(_)));
    }

    #[tokio::test]
    async fn response_uses_failure_envelope() {
        let resp = AuthError::PermissionDenied("post:drinks".into()).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "permission_denied");

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], 403);
        assert_eq!(json["message"], "Permission not found in JWT.");
    }

    #[tokio::test]
    async fn key_set_detail_is_not_rendered() {
        let resp = AuthError::KeySetUnavailable("connection refused to 10.0.0.7".into()).into_response();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("10.0.0.7"));
        assert!(text.contains("Unable to retrieve signing keys."));
    }
}
