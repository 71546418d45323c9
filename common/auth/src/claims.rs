use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Application-focused representation of verified JWT claims.
#[derive(Debug, Clone, Serialize)]
pub struct Claims {
    pub subject: Option<String>,
    pub issuer: String,
    pub audience: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    /// `None` when the token carries no `permissions` claim at all.
    pub permissions: Option<Vec<String>>,
    pub raw: serde_json::Value,
}

impl Claims {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .as_deref()
            .is_some_and(|granted| granted.iter().any(|value| value == permission))
    }

    /// Look up any claim by name, including ones without a typed field.
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.raw.get(name)
    }
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    #[serde(default)]
    sub: Option<String>,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    iss: String,
    aud: AudienceRepr,
    #[serde(default)]
    permissions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AudienceRepr {
    Single(String),
    Many(Vec<String>),
}

fn timestamp(claim: &'static str, value: i64) -> AuthResult<DateTime<Utc>> {
    Utc.timestamp_opt(value, 0)
        .single()
        .ok_or_else(|| AuthError::TokenUnparseable(format!("claim '{claim}' out of range: {value}")))
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = AuthError;

    fn try_from(value: ClaimsRepr) -> AuthResult<Self> {
        let expires_at = timestamp("exp", value.exp)?;
        let issued_at = value.iat.map(|iat| timestamp("iat", iat)).transpose()?;

        let audience = match value.aud {
            AudienceRepr::Single(item) => vec![item],
            AudienceRepr::Many(items) => items,
        };

        Ok(Self {
            subject: value.sub,
            issuer: value.iss,
            audience,
            expires_at,
            issued_at,
            permissions: value.permissions,
            raw: serde_json::Value::Null,
        })
    }
}

impl TryFrom<serde_json::Value> for Claims {
    type Error = AuthError;

    fn try_from(value: serde_json::Value) -> AuthResult<Self> {
        let repr: ClaimsRepr = serde_json::from_value(value.clone())
            .map_err(|err| AuthError::TokenUnparseable(format!("claim payload: {err}")))?;
        let mut claims = Claims::try_from(repr)?;
        claims.raw = value;
        Ok(claims)
    }
}
