use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use crate::authorizer::TokenAuthorizer;
use crate::error::AuthError;
use crate::extractors::AuthContext;

/// Route-level requirement for one permission.
///
/// ```ignore
/// post(create_drink).route_layer(from_fn_with_state(
///     PermissionGuard::new(authorizer.clone(), POST_DRINKS),
///     require_permission,
/// ))
/// ```
#[derive(Clone)]
pub struct PermissionGuard {
    authorizer: Arc<TokenAuthorizer>,
    permission: &'static str,
}

impl PermissionGuard {
    pub fn new(authorizer: Arc<TokenAuthorizer>, permission: &'static str) -> Self {
        Self {
            authorizer,
            permission,
        }
    }
}

/// Middleware that authorizes the request before the handler runs and
/// attaches the resulting [`AuthContext`] to the request extensions.
pub async fn require_permission(
    State(guard): State<PermissionGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header = request.headers().get(AUTHORIZATION).cloned();
    let context = AuthContext::authorize(&guard.authorizer, header.as_ref(), guard.permission)
        .await
        .inspect_err(|err| {
            debug!(permission = guard.permission, code = err.code(), "request not authorized");
        })?;

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}
