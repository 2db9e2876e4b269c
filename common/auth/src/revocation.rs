use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use crate::claims::Claims;
use crate::config::EngineConfig;
use crate::error::{AuthError, AuthResult};

/// Decides whether an otherwise valid token has been revoked.
///
/// Runs synchronously on the verifying thread. Implementations that consult an
/// external store may block or fail; errors are returned to the caller as-is.
pub trait RevocationCheck: Send + Sync {
    fn is_revoked(&self, claims: &Claims) -> AuthResult<bool>;
}

impl<F> RevocationCheck for F
where
    F: Fn(&Claims) -> bool + Send + Sync,
{
    fn is_revoked(&self, claims: &Claims) -> AuthResult<bool> {
        Ok(self(claims))
    }
}

/// Thread-safe set of revoked token ids (`jti`).
#[derive(Clone, Default)]
pub struct InMemoryDenylist {
    inner: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryDenylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self, jti: impl Into<String>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(jti.into());
    }

    pub fn contains(&self, jti: &str) -> bool {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.contains(jti)
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RevocationCheck for InMemoryDenylist {
    fn is_revoked(&self, claims: &Claims) -> AuthResult<bool> {
        Ok(self.contains(&claims.jti))
    }
}

/// Post-verification revocation step.
pub struct RevocationGate<'a> {
    enabled: bool,
    check: Option<&'a dyn RevocationCheck>,
}

impl<'a> RevocationGate<'a> {
    pub fn new(config: &EngineConfig, check: Option<&'a dyn RevocationCheck>) -> Self {
        Self {
            enabled: config.blacklist_enabled,
            check,
        }
    }

    pub fn check(&self, claims: &Claims) -> AuthResult<()> {
        if !self.enabled {
            return Ok(());
        }

        let check = self.check.ok_or_else(|| {
            AuthError::config(
                "A revocation check must be registered on the token engine \
                 when AUTHJWT_BLACKLIST_ENABLED is 'true'",
            )
        })?;

        if check.is_revoked(claims)? {
            warn!(jti = %claims.jti, token_type = %claims.token_type, "rejected revoked token");
            return Err(AuthError::Revoked);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{Identity, TokenType};

    fn claims() -> Claims {
        Claims::build(Identity::from("test"), TokenType::Refresh, None, None, None, None)
            .expect("claims")
    }

    #[test]
    fn denylist_revoke_round_trip() {
        let denylist = InMemoryDenylist::new();
        assert!(denylist.is_empty());
        denylist.revoke("abc");
        assert!(denylist.contains("abc"));
        assert!(!denylist.contains("def"));
        assert_eq!(denylist.len(), 1);

        let shared = denylist.clone();
        shared.revoke("def");
        assert!(denylist.contains("def"));
    }

    #[test]
    fn disabled_gate_is_a_no_op() {
        let gate = RevocationGate::new(&EngineConfig::new("secret"), None);
        gate.check(&claims()).expect("disabled gate passes");
    }

    #[test]
    fn enabled_gate_requires_a_check() {
        let config = EngineConfig::new("secret").with_blacklist([TokenType::Refresh]);
        let gate = RevocationGate::new(&config, None);
        assert!(matches!(gate.check(&claims()), Err(AuthError::Config(_))));
    }

    #[test]
    fn enabled_gate_consults_the_check() {
        let config = EngineConfig::new("secret").with_blacklist([TokenType::Refresh]);
        let claims = claims();

        let denylist = InMemoryDenylist::new();
        let gate = RevocationGate::new(&config, Some(&denylist));
        gate.check(&claims).expect("not revoked yet");

        denylist.revoke(claims.jti.clone());
        assert!(matches!(gate.check(&claims), Err(AuthError::Revoked)));

        let always = |_: &Claims| true;
        let gate = RevocationGate::new(&config, Some(&always));
        assert!(matches!(gate.check(&claims), Err(AuthError::Revoked)));
    }

    struct FailingStore;

    impl RevocationCheck for FailingStore {
        fn is_revoked(&self, _claims: &Claims) -> AuthResult<bool> {
            Err(AuthError::config("revocation store unreachable"))
        }
    }

    #[test]
    fn check_failures_propagate() {
        let config = EngineConfig::new("secret").with_blacklist([TokenType::Refresh]);
        let gate = RevocationGate::new(&config, Some(&FailingStore));
        let err = gate.check(&claims()).expect_err("store failure");
        assert_eq!(err.to_string(), "revocation store unreachable");
    }
}
