use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{delete, get, post};
use axum::Router;
use jwt_auth::{AuthError, Authorize, InMemoryDenylist, TokenEngine};

use crate::config::ServiceConfig;
use crate::handlers::{
    health, login, metrics_endpoint, partially_protected, protected, protected_fresh, raw_token,
    refresh, revoke_access, revoke_refresh,
};
use crate::metrics::AuthMetrics;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TokenEngine>,
    pub denylist: InMemoryDenylist,
    pub config: Arc<ServiceConfig>,
    pub metrics: Arc<AuthMetrics>,
}

impl FromRef<AppState> for Arc<TokenEngine> {
    fn from_ref(state: &AppState) -> Self {
        state.engine.clone()
    }
}

impl FromRef<AppState> for Arc<ServiceConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl AppState {
    /// Count a rejected credential and hand the error back for the response.
    pub fn reject(&self, err: AuthError) -> AuthError {
        self.metrics.token_rejected(err.code());
        err
    }

    /// Unwrap the `Authorize` extractor, counting a malformed header.
    pub fn authorize(
        &self,
        extracted: Result<Authorize, AuthError>,
    ) -> Result<Authorize, AuthError> {
        extracted.map_err(|err| self.reject(err))
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/protected", get(protected))
        .route("/partially-protected", get(partially_protected))
        .route("/protected-fresh", get(protected_fresh))
        .route("/raw-token", get(raw_token))
        .route("/access-revoke", delete(revoke_access))
        .route("/refresh-revoke", delete(revoke_refresh))
        .with_state(state)
}
