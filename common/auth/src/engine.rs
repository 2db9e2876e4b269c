use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, info};

use crate::claims::{Audience, Claims, Identity, TokenType};
use crate::config::EngineConfig;
use crate::error::{AuthError, AuthResult};
use crate::expiry::{ExpiresIn, ExpiryPolicy};
use crate::revocation::{RevocationCheck, RevocationGate};
use crate::signer::{ClaimChecks, Headers, TokenSigner};

/// Per-call options for issuing a token.
#[derive(Debug, Clone, Default)]
pub struct TokenOptions {
    pub headers: Option<Headers>,
    pub expires: ExpiresIn,
    pub audience: Option<Audience>,
}

impl TokenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expires(mut self, expires: impl Into<ExpiresIn>) -> Self {
        self.expires = expires.into();
        self
    }

    pub fn audience(mut self, audience: impl Into<Audience>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers
            .get_or_insert_with(Headers::new)
            .insert(name.into(), value.into());
        self
    }
}

/// Everything derived from one configuration; swapped as a unit on reload.
struct EngineState {
    config: EngineConfig,
    signer: TokenSigner,
    expiry: ExpiryPolicy,
}

impl EngineState {
    fn build(config: EngineConfig) -> AuthResult<Self> {
        config.validate()?;
        let signer = TokenSigner::from_config(&config)?;
        let expiry = config.expiry_policy();
        Ok(Self {
            config,
            signer,
            expiry,
        })
    }
}

/// Issues and verifies access/refresh tokens.
///
/// Stateless between calls: every guard and accessor verifies the token it is
/// given from scratch against the current configuration snapshot.
pub struct TokenEngine {
    state: RwLock<Arc<EngineState>>,
    revocation: Option<Arc<dyn RevocationCheck>>,
}

impl TokenEngine {
    pub fn new(config: EngineConfig) -> AuthResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: EngineConfig) -> TokenEngineBuilder {
        TokenEngineBuilder::new(config)
    }

    /// Replace the configuration. The new state is built before the swap, so a
    /// rejected configuration leaves the engine untouched.
    pub fn reload(&self, config: EngineConfig) -> AuthResult<()> {
        let next = Arc::new(EngineState::build(config)?);
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *guard = next;
        info!("token engine configuration reloaded");
        Ok(())
    }

    pub fn config(&self) -> EngineConfig {
        self.snapshot().config.clone()
    }

    fn snapshot(&self) -> Arc<EngineState> {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn create_access_token(
        &self,
        identity: impl Into<Identity>,
        fresh: bool,
        options: TokenOptions,
    ) -> AuthResult<String> {
        let state = self.snapshot();
        let issuer = state.config.encode_issuer.clone();
        Self::create_token(
            &state,
            identity.into(),
            TokenType::Access,
            Some(fresh),
            issuer.as_deref(),
            options,
        )
    }

    /// Refresh tokens never carry an issuer.
    pub fn create_refresh_token(
        &self,
        identity: impl Into<Identity>,
        options: TokenOptions,
    ) -> AuthResult<String> {
        let state = self.snapshot();
        Self::create_token(
            &state,
            identity.into(),
            TokenType::Refresh,
            None,
            None,
            options,
        )
    }

    fn create_token(
        state: &EngineState,
        identity: Identity,
        token_type: TokenType,
        fresh: Option<bool>,
        issuer: Option<&str>,
        options: TokenOptions,
    ) -> AuthResult<String> {
        let exp = state.expiry.resolve(token_type, options.expires);
        let claims = Claims::build(identity, token_type, fresh, exp, issuer, options.audience)?;
        let token = state.signer.sign(&claims, options.headers.as_ref())?;
        debug!(jti = %claims.jti, %token_type, "issued token");
        Ok(token)
    }

    /// Only a valid access token passes.
    pub fn require_access(&self, token: Option<&str>) -> AuthResult<()> {
        let token = token.ok_or(AuthError::MissingAuthorization)?;
        let state = self.snapshot();
        let claims = self.verify_guarded(&state, token, state.config.decode_issuer.as_deref())?;
        ensure_type(&claims, TokenType::Access)
    }

    /// Passes when no token is present; a present token must be a valid access token.
    pub fn optional_access(&self, token: Option<&str>) -> AuthResult<()> {
        match token {
            Some(token) => self.require_access(Some(token)),
            None => Ok(()),
        }
    }

    /// Only a valid refresh token passes. The issuer is not checked.
    pub fn require_refresh(&self, token: Option<&str>) -> AuthResult<()> {
        let token = token.ok_or(AuthError::MissingAuthorization)?;
        let state = self.snapshot();
        let claims = self.verify_guarded(&state, token, None)?;
        ensure_type(&claims, TokenType::Refresh)
    }

    /// Only a valid access token issued straight from credentials passes.
    pub fn require_fresh_access(&self, token: Option<&str>) -> AuthResult<()> {
        let token = token.ok_or(AuthError::MissingAuthorization)?;
        let state = self.snapshot();
        let claims = self.verify_guarded(&state, token, state.config.decode_issuer.as_deref())?;
        ensure_type(&claims, TokenType::Access)?;
        if !claims.is_fresh() {
            return Err(AuthError::StaleToken);
        }
        Ok(())
    }

    /// Verified claims of `token`, or `None` when there is no token.
    pub fn raw_claims(&self, token: Option<&str>) -> AuthResult<Option<Claims>> {
        token
            .map(|token| Self::verify(&self.snapshot(), token, None))
            .transpose()
    }

    pub fn identity(&self, token: Option<&str>) -> AuthResult<Option<Identity>> {
        Ok(self.raw_claims(token)?.map(|claims| claims.identity))
    }

    /// Verified `jti`, the key used for revocation lists.
    pub fn token_id(&self, token: &str) -> AuthResult<String> {
        Ok(Self::verify(&self.snapshot(), token, None)?.jti)
    }

    /// Header of `token` without any signature check. Never base an
    /// authorization decision on the result.
    pub fn unverified_headers(&self, token: &str) -> AuthResult<Headers> {
        self.snapshot().signer.unverified_header(token)
    }

    fn verify(state: &EngineState, token: &str, issuer: Option<&str>) -> AuthResult<Claims> {
        let checks = ClaimChecks {
            issuer,
            audience: state.config.decode_audience.as_ref(),
            leeway: state.config.decode_leeway,
        };
        let claims = state.signer.verify(token, &checks)?;
        debug!(jti = %claims.jti, token_type = %claims.token_type, "verified token");
        Ok(claims)
    }

    fn verify_guarded(
        &self,
        state: &EngineState,
        token: &str,
        issuer: Option<&str>,
    ) -> AuthResult<Claims> {
        let claims = Self::verify(state, token, issuer)?;
        if state.config.checks_blacklist_for(claims.token_type) {
            RevocationGate::new(&state.config, self.revocation.as_deref()).check(&claims)?;
        }
        Ok(claims)
    }
}

fn ensure_type(claims: &Claims, expected: TokenType) -> AuthResult<()> {
    if claims.token_type == expected {
        Ok(())
    } else {
        Err(AuthError::WrongTokenType { expected })
    }
}

pub struct TokenEngineBuilder {
    config: EngineConfig,
    revocation: Option<Arc<dyn RevocationCheck>>,
}

impl TokenEngineBuilder {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            revocation: None,
        }
    }

    pub fn with_revocation_check<R>(mut self, check: R) -> Self
    where
        R: RevocationCheck + 'static,
    {
        self.revocation = Some(Arc::new(check));
        self
    }

    pub fn with_revocation_fn<F>(self, check: F) -> Self
    where
        F: Fn(&Claims) -> bool + Send + Sync + 'static,
    {
        self.with_revocation_check(check)
    }

    pub fn build(self) -> AuthResult<TokenEngine> {
        let state = EngineState::build(self.config)?;
        Ok(TokenEngine {
            state: RwLock::new(Arc::new(state)),
            revocation: self.revocation,
        })
    }
}
