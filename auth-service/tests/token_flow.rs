use std::sync::Arc;

use anyhow::Result;
use auth_service::config::ServiceConfig;
use auth_service::metrics::AuthMetrics;
use auth_service::{build_router, AppState};
use axum::body::Body;
use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Method, Request, StatusCode,
};
use axum::Router;
use http_body_util::BodyExt;
use jwt_auth::{EngineConfig, InMemoryDenylist, TokenEngine, TokenOptions, TokenType};
use serde_json::{json, Value};
use tower::util::ServiceExt;

const SECRET: &str = "secret-key";

fn test_app() -> Result<(Router, AppState)> {
    let denylist = InMemoryDenylist::new();
    let engine = TokenEngine::builder(
        EngineConfig::new(SECRET).with_blacklist([TokenType::Access, TokenType::Refresh]),
    )
    .with_revocation_check(denylist.clone())
    .build()?;

    let state = AppState {
        engine: Arc::new(engine),
        denylist,
        config: Arc::new(ServiceConfig::default()),
        metrics: Arc::new(AuthMetrics::new()?),
    };
    Ok((build_router(state.clone()), state))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body)?).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    Ok((status, value))
}

async fn login(app: &Router) -> Result<(String, String)> {
    let (status, body) = send(
        app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "username": "test", "password": "test" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let access = body["access_token"].as_str().unwrap_or_default().to_string();
    let refresh = body["refresh_token"].as_str().unwrap_or_default().to_string();
    Ok((access, refresh))
}

#[tokio::test]
async fn login_issues_a_fresh_token_pair() -> Result<()> {
    let (app, state) = test_app()?;
    let (access, refresh) = login(&app).await?;

    let (status, body) = send(&app, Method::GET, "/protected", Some(&access), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "hello": "world" }));

    let (status, body) = send(&app, Method::GET, "/protected-fresh", Some(&access), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "user": "test" }));

    let (status, body) = send(&app, Method::GET, "/raw-token", Some(&access), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], json!("access"));
    assert_eq!(body["fresh"], json!(true));
    assert_eq!(body["identity"], json!("test"));
    assert!(body["exp"].is_i64());

    let (status, _) = send(&app, Method::GET, "/protected", Some(&refresh), None).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(state.metrics.issued_count(TokenType::Access), 1);
    assert_eq!(state.metrics.issued_count(TokenType::Refresh), 1);
    Ok(())
}

#[tokio::test]
async fn bad_credentials_are_rejected() -> Result<()> {
    let (app, _) = test_app()?;
    let (status, body) = send(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "username": "test", "password": "nope" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], json!("Bad username or password"));
    Ok(())
}

#[tokio::test]
async fn missing_and_malformed_headers() -> Result<()> {
    let (app, state) = test_app()?;

    let (status, body) = send(&app, Method::GET, "/protected", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], json!("Missing Authorization Header"));

    let (status, body) = send(&app, Method::GET, "/partially-protected", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "user": null }));

    let request = Request::builder()
        .uri("/protected")
        .header(AUTHORIZATION, "Token abc")
        .body(Body::empty())?;
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(state.metrics.rejected_count("AUTH_HEADER"), 2);
    Ok(())
}

#[tokio::test]
async fn token_type_is_enforced_per_route() -> Result<()> {
    let (app, _) = test_app()?;
    let (access, refresh) = login(&app).await?;

    let (status, body) = send(&app, Method::POST, "/refresh", Some(&access), None).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], json!("Only refresh tokens are allowed"));

    let (status, body) = send(&app, Method::GET, "/protected", Some(&refresh), None).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], json!("Only access tokens are allowed"));

    let (status, _) = send(
        &app,
        Method::GET,
        "/partially-protected",
        Some(&refresh),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[tokio::test]
async fn refreshed_access_token_is_not_fresh() -> Result<()> {
    let (app, _) = test_app()?;
    let (_, refresh) = login(&app).await?;

    let (status, body) = send(&app, Method::POST, "/refresh", Some(&refresh), None).await?;
    assert_eq!(status, StatusCode::OK);
    let access = body["access_token"].as_str().unwrap_or_default().to_string();

    let (status, _) = send(&app, Method::GET, "/protected", Some(&access), None).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, "/protected-fresh", Some(&access), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], json!("Fresh token required"));
    Ok(())
}

#[tokio::test]
async fn revoked_tokens_are_rejected() -> Result<()> {
    let (app, state) = test_app()?;
    let (access, refresh) = login(&app).await?;

    let (status, body) = send(&app, Method::DELETE, "/access-revoke", Some(&access), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], json!("Access token revoked"));

    let (status, body) = send(&app, Method::GET, "/protected", Some(&access), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], json!("Token has been revoked"));

    let (status, _) = send(&app, Method::DELETE, "/refresh-revoke", Some(&refresh), None).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::POST, "/refresh", Some(&refresh), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(state.denylist.len(), 2);
    assert_eq!(state.metrics.rejected_count("AUTH_REVOKED"), 2);
    Ok(())
}

#[tokio::test]
async fn expired_and_forged_tokens_fail_verification() -> Result<()> {
    let (app, state) = test_app()?;

    let expired = state
        .engine
        .create_access_token("test", false, TokenOptions::new().expires(-10))?;
    let (status, body) = send(&app, Method::GET, "/protected", Some(&expired), None).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], json!("Signature has expired"));

    let foreign = TokenEngine::new(EngineConfig::new("another-secret"))?;
    let forged = foreign.create_access_token("test", true, TokenOptions::new())?;
    let (status, body) = send(&app, Method::GET, "/protected", Some(&forged), None).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], json!("Signature verification failed"));

    assert_eq!(state.metrics.rejected_count("AUTH_TOKEN"), 2);
    Ok(())
}

#[tokio::test]
async fn health_and_metrics_endpoints() -> Result<()> {
    let (app, _) = test_app()?;
    login(&app).await?;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await?.to_bytes();
    let text = String::from_utf8(bytes.to_vec())?;
    assert!(text.contains("auth_tokens_issued_total{type=\"access\"} 1"));
    Ok(())
}
