use chrono::{Duration, Utc};

use crate::claims::TokenType;
use crate::error::{AuthError, AuthResult};

/// Per-call expiry override for a new token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiresIn {
    /// Use the configured lifetime for the token type.
    #[default]
    Default,
    /// Issue the token without an `exp` claim.
    Disabled,
    /// Expire this long after issuance.
    Custom(Duration),
}

impl From<bool> for ExpiresIn {
    fn from(value: bool) -> Self {
        if value {
            ExpiresIn::Default
        } else {
            ExpiresIn::Disabled
        }
    }
}

impl From<Duration> for ExpiresIn {
    fn from(value: Duration) -> Self {
        ExpiresIn::Custom(value)
    }
}

impl TryFrom<i64> for ExpiresIn {
    type Error = AuthError;

    fn try_from(seconds: i64) -> AuthResult<Self> {
        Duration::try_seconds(seconds)
            .map(ExpiresIn::Custom)
            .ok_or_else(|| {
                AuthError::invalid_input(format!("expires_time {seconds} is out of range"))
            })
    }
}

impl From<i32> for ExpiresIn {
    fn from(seconds: i32) -> Self {
        ExpiresIn::Custom(Duration::seconds(seconds.into()))
    }
}

/// Configured default lifetimes. `None` means tokens of that type never expire
/// unless the caller asks for a custom lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub access: Option<Duration>,
    pub refresh: Option<Duration>,
}

impl ExpiryPolicy {
    pub fn new(access: Option<Duration>, refresh: Option<Duration>) -> Self {
        Self { access, refresh }
    }

    pub fn default_for(&self, token_type: TokenType) -> Option<Duration> {
        match token_type {
            TokenType::Access => self.access,
            TokenType::Refresh => self.refresh,
        }
    }

    /// Absolute `exp` value for a token issued now, or `None` for no expiry.
    pub fn resolve(&self, token_type: TokenType, expires: ExpiresIn) -> Option<i64> {
        self.resolve_at(Utc::now().timestamp(), token_type, expires)
    }

    pub fn resolve_at(&self, now: i64, token_type: TokenType, expires: ExpiresIn) -> Option<i64> {
        let lifetime = match expires {
            ExpiresIn::Disabled => return None,
            ExpiresIn::Default => self.default_for(token_type)?,
            ExpiresIn::Custom(duration) => duration,
        };
        Some(now.saturating_add(lifetime.num_seconds()))
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            access: Some(Duration::minutes(15)),
            refresh: Some(Duration::days(30)),
        }
    }
}
