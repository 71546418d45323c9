use tracing::debug;

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};

pub const GET_DRINKS_DETAIL: &str = "get:drinks-detail";
pub const POST_DRINKS: &str = "post:drinks";
pub const PATCH_DRINKS: &str = "patch:drinks";
pub const DELETE_DRINKS: &str = "delete:drinks";

/// Require `permission` in the token's `permissions` claim.
///
/// An empty `permission` only requires the claim to be present.
pub fn check_permission(claims: &Claims, permission: &str) -> AuthResult<()> {
    let Some(granted) = claims.permissions.as_deref() else {
        return Err(AuthError::PermissionsClaimMissing);
    };

    if permission.is_empty() || claims.has_permission(permission) {
        return Ok(());
    }

    debug!(permission, granted = ?granted, "permission not granted");
    Err(AuthError::PermissionDenied(permission.to_string()))
}
