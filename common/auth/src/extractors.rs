use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderValue};

use crate::claims::{Claims, Identity};
use crate::engine::{TokenEngine, TokenOptions};
use crate::error::{AuthError, AuthResult};
use crate::signer::Headers;

/// Bearer credential presented with a single request, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    token: Option<String>,
}

impl RequestContext {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    /// Build from the raw `Authorization` header value. The header must read
    /// exactly `Bearer <token>`.
    pub fn from_authorization(header: Option<&str>) -> AuthResult<Self> {
        let token = header.map(parse_bearer).transpose()?;
        Ok(Self { token })
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .map(header_str)
            .transpose()?;
        RequestContext::from_authorization(header)
    }
}

/// Request-scoped handle pairing the shared engine with the request's token.
#[derive(Clone)]
pub struct Authorize {
    engine: Arc<TokenEngine>,
    context: RequestContext,
}

impl Authorize {
    pub fn new(engine: Arc<TokenEngine>, context: RequestContext) -> Self {
        Self { engine, context }
    }

    pub fn token(&self) -> Option<&str> {
        self.context.token()
    }

    pub fn engine(&self) -> &TokenEngine {
        &self.engine
    }

    pub fn require_access(&self) -> AuthResult<()> {
        self.engine.require_access(self.token())
    }

    pub fn optional_access(&self) -> AuthResult<()> {
        self.engine.optional_access(self.token())
    }

    pub fn require_refresh(&self) -> AuthResult<()> {
        self.engine.require_refresh(self.token())
    }

    pub fn require_fresh_access(&self) -> AuthResult<()> {
        self.engine.require_fresh_access(self.token())
    }

    pub fn raw_claims(&self) -> AuthResult<Option<Claims>> {
        self.engine.raw_claims(self.token())
    }

    pub fn identity(&self) -> AuthResult<Option<Identity>> {
        self.engine.identity(self.token())
    }

    pub fn token_id(&self, token: &str) -> AuthResult<String> {
        self.engine.token_id(token)
    }

    /// Header of `token`, or of the request's own token when `None`.
    pub fn unverified_headers(&self, token: Option<&str>) -> AuthResult<Headers> {
        let token = token
            .or_else(|| self.token())
            .ok_or(AuthError::MissingAuthorization)?;
        self.engine.unverified_headers(token)
    }

    pub fn create_access_token(
        &self,
        identity: impl Into<Identity>,
        fresh: bool,
        options: TokenOptions,
    ) -> AuthResult<String> {
        self.engine.create_access_token(identity, fresh, options)
    }

    pub fn create_refresh_token(
        &self,
        identity: impl Into<Identity>,
        options: TokenOptions,
    ) -> AuthResult<String> {
        self.engine.create_refresh_token(identity, options)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Authorize
where
    Arc<TokenEngine>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let engine = Arc::<TokenEngine>::from_ref(state);
        let context = RequestContext::from_request_parts(parts, state).await?;
        Ok(Self { engine, context })
    }
}

fn header_str(value: &HeaderValue) -> AuthResult<&str> {
    value.to_str().map_err(|_| AuthError::InvalidAuthorization)
}

fn parse_bearer(raw: &str) -> AuthResult<String> {
    let mut fields = raw.split(' ');
    match (fields.next(), fields.next(), fields.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token.to_owned()),
        _ => Err(AuthError::InvalidAuthorization),
    }
}
