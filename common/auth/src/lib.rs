pub mod authorizer;
pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod jwks;
pub mod key_cache;
pub mod permissions;

pub use authorizer::{extract_bearer, TokenAuthorizer};
pub use claims::Claims;
pub use config::JwtConfig;
pub use error::{AuthError, AuthResult, MalformedHeader};
pub use extractors::AuthContext;
pub use guards::{require_permission, PermissionGuard};
pub use jwks::{JwksFetcher, KeySet, KeySetProvider, SigningKey, StaticKeySetProvider};
pub use key_cache::CachedKeySetProvider;
pub use permissions::check_permission;
