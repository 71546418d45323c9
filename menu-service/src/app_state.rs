use std::sync::Arc;
use axum::extract::FromRef;
use common_auth::TokenAuthorizer;

use crate::drinks::DrinkStore;

/// Shared application state used by handlers and the permission guards.
#[derive(Clone)]
pub struct AppState {
    pub(crate) store: DrinkStore,
    pub(crate) authorizer: Arc<TokenAuthorizer>,
}

impl AppState {
    pub fn new(store: DrinkStore, authorizer: Arc<TokenAuthorizer>) -> Self {
        Self { store, authorizer }
    }
}

impl FromRef<AppState> for Arc<TokenAuthorizer> {
    fn from_ref(state: &AppState) -> Self { state.authorizer.clone() }
}
