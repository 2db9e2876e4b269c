use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jwt_auth::{AuthError, Authorize, Claims, TokenOptions, TokenType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::app::AppState;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Bad username or password")]
    BadCredentials,
    #[error("Failed to render metrics: {0}")]
    Metrics(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, code) = match self {
            ApiError::Auth(err) => return err.into_response(),
            ApiError::BadCredentials => (StatusCode::UNAUTHORIZED, "AUTH_LOGIN"),
            ApiError::Metrics(_) => (StatusCode::INTERNAL_SERVER_ERROR, "METRICS"),
        };
        (status, Json(ErrorBody { code, message })).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct AccessToken {
    pub access_token: String,
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Result<Response, ApiError> {
    state
        .metrics
        .render()
        .map_err(|err| ApiError::Metrics(err.to_string()))
}

pub async fn login(
    State(state): State<AppState>,
    Json(login): Json<LoginRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let LoginRequest { username, password } = login;
    if !state.config.accepts(&username, &password) {
        warn!(%username, "login rejected");
        state.metrics.token_rejected("AUTH_LOGIN");
        return Err(ApiError::BadCredentials);
    }

    let access_token = state
        .engine
        .create_access_token(username.as_str(), true, TokenOptions::new())?;
    state.metrics.token_issued(TokenType::Access);
    let refresh_token = state
        .engine
        .create_refresh_token(username.as_str(), TokenOptions::new())?;
    state.metrics.token_issued(TokenType::Refresh);

    info!(%username, "issued token pair");
    Ok(Json(TokenPair {
        access_token,
        refresh_token,
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    auth: Result<Authorize, AuthError>,
) -> Result<Json<AccessToken>, ApiError> {
    let auth = state.authorize(auth)?;
    auth.require_refresh().map_err(|err| state.reject(err))?;
    let identity = auth.identity()?.ok_or(AuthError::MissingAuthorization)?;

    let access_token = auth.create_access_token(identity, false, TokenOptions::new())?;
    state.metrics.token_issued(TokenType::Access);
    Ok(Json(AccessToken { access_token }))
}

pub async fn protected(
    State(state): State<AppState>,
    auth: Result<Authorize, AuthError>,
) -> Result<Json<Value>, ApiError> {
    let auth = state.authorize(auth)?;
    auth.require_access().map_err(|err| state.reject(err))?;
    Ok(Json(json!({ "hello": "world" })))
}

pub async fn partially_protected(
    State(state): State<AppState>,
    auth: Result<Authorize, AuthError>,
) -> Result<Json<Value>, ApiError> {
    let auth = state.authorize(auth)?;
    auth.optional_access().map_err(|err| state.reject(err))?;
    let identity = auth.identity()?;
    Ok(Json(json!({ "user": identity })))
}

pub async fn protected_fresh(
    State(state): State<AppState>,
    auth: Result<Authorize, AuthError>,
) -> Result<Json<Value>, ApiError> {
    let auth = state.authorize(auth)?;
    auth.require_fresh_access().map_err(|err| state.reject(err))?;
    let identity = auth.identity()?;
    Ok(Json(json!({ "user": identity })))
}

pub async fn raw_token(
    State(state): State<AppState>,
    auth: Result<Authorize, AuthError>,
) -> Result<Json<Value>, ApiError> {
    let auth = state.authorize(auth)?;
    auth.require_access().map_err(|err| state.reject(err))?;
    let claims = current_claims(&auth)?;
    Ok(Json(claims.to_value()?))
}

pub async fn revoke_access(
    State(state): State<AppState>,
    auth: Result<Authorize, AuthError>,
) -> Result<Json<Value>, ApiError> {
    let auth = state.authorize(auth)?;
    auth.require_access().map_err(|err| state.reject(err))?;
    let claims = current_claims(&auth)?;
    state.denylist.revoke(claims.jti.clone());
    info!(jti = %claims.jti, "access token revoked");
    Ok(Json(json!({ "msg": "Access token revoked" })))
}

pub async fn revoke_refresh(
    State(state): State<AppState>,
    auth: Result<Authorize, AuthError>,
) -> Result<Json<Value>, ApiError> {
    let auth = state.authorize(auth)?;
    auth.require_refresh().map_err(|err| state.reject(err))?;
    let claims = current_claims(&auth)?;
    state.denylist.revoke(claims.jti.clone());
    info!(jti = %claims.jti, "refresh token revoked");
    Ok(Json(json!({ "msg": "Refresh token revoked" })))
}

fn current_claims(auth: &Authorize) -> Result<Claims, ApiError> {
    auth.raw_claims()?
        .ok_or(ApiError::Auth(AuthError::MissingAuthorization))
}
