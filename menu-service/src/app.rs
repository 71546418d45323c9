use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware::{self, from_fn_with_state},
    routing::{delete, get, patch, post, MethodRouter},
    Router,
};
use common_auth::permissions::{DELETE_DRINKS, GET_DRINKS_DETAIL, PATCH_DRINKS, POST_DRINKS};
use common_auth::{require_permission, PermissionGuard, TokenAuthorizer};
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::AppState;
use crate::drink_handlers::{
    create_drink, delete_drink, list_drinks, list_drinks_detail, route_not_found, update_drink,
};
use crate::metrics::{self, http_error_metrics};

pub async fn health() -> &'static str { "ok" }

async fn metrics_handler() -> (StatusCode, String) {
    match metrics::render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("metrics encode error: {e}")),
    }
}

/// Protect every method currently on `route` with `permission`.
fn guarded(
    route: MethodRouter<AppState>,
    authorizer: &Arc<TokenAuthorizer>,
    permission: &'static str,
) -> MethodRouter<AppState> {
    route.route_layer(from_fn_with_state(
        PermissionGuard::new(authorizer.clone(), permission),
        require_permission,
    ))
}

pub fn build_router(state: AppState) -> Router {
    let authorizer = state.authorizer.clone();
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_handler))
        .route(
            "/drinks",
            get(list_drinks).merge(guarded(post(create_drink), &authorizer, POST_DRINKS)),
        )
        .route(
            "/drinks-detail",
            guarded(get(list_drinks_detail), &authorizer, GET_DRINKS_DETAIL),
        )
        .route(
            "/drinks/:id",
            guarded(patch(update_drink), &authorizer, PATCH_DRINKS)
                .merge(guarded(delete(delete_drink), &authorizer, DELETE_DRINKS)),
        )
        .fallback(route_not_found)
        .with_state(state)
        .layer(cors)
        .layer(middleware::from_fn(http_error_metrics))
}
