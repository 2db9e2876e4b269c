use std::collections::HashSet;
use std::env;
use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use jsonwebtoken::Algorithm;
use tracing::debug;

use crate::claims::{Audience, TokenType};
use crate::error::{AuthError, AuthResult};
use crate::expiry::ExpiryPolicy;

const ENV_PREFIX: &str = "authjwt_";

/// Runtime configuration for issuing and verifying tokens.
#[derive(Clone, PartialEq)]
pub struct EngineConfig {
    /// Shared secret for HMAC algorithms.
    pub secret_key: Option<String>,
    /// PEM public key for asymmetric verification.
    pub public_key: Option<String>,
    /// PEM private key for asymmetric signing.
    pub private_key: Option<String>,
    /// Algorithm used when signing.
    pub algorithm: Algorithm,
    /// Algorithms accepted when decoding. `None` means only `algorithm`.
    pub decode_algorithms: Option<Vec<Algorithm>>,
    /// Allowable clock skew in seconds when validating exp/nbf.
    pub decode_leeway: u64,
    /// Issuer stamped on access tokens.
    pub encode_issuer: Option<String>,
    /// Issuer required on access tokens during verification.
    pub decode_issuer: Option<String>,
    /// Audience(s) accepted during verification.
    pub decode_audience: Option<Audience>,
    pub blacklist_enabled: bool,
    /// Token types that go through the revocation check.
    pub blacklist_token_checks: HashSet<TokenType>,
    /// Default access token lifetime. `None` disables expiry.
    pub access_token_expires: Option<Duration>,
    /// Default refresh token lifetime. `None` disables expiry.
    pub refresh_token_expires: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let expiry = ExpiryPolicy::default();
        Self {
            secret_key: None,
            public_key: None,
            private_key: None,
            algorithm: Algorithm::HS256,
            decode_algorithms: None,
            decode_leeway: 0,
            encode_issuer: None,
            decode_issuer: None,
            decode_audience: None,
            blacklist_enabled: false,
            blacklist_token_checks: HashSet::new(),
            access_token_expires: expiry.access,
            refresh_token_expires: expiry.refresh,
        }
    }
}

impl EngineConfig {
    /// HS256 configuration signing with the given shared secret.
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: Some(secret_key.into()),
            ..Self::default()
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_decode_algorithms(mut self, algorithms: impl Into<Vec<Algorithm>>) -> Self {
        self.decode_algorithms = Some(algorithms.into());
        self
    }

    pub fn with_keys(mut self, private_pem: impl Into<String>, public_pem: impl Into<String>) -> Self {
        self.private_key = Some(private_pem.into());
        self.public_key = Some(public_pem.into());
        self
    }

    /// Adjust the allowed leeway.
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.decode_leeway = seconds;
        self
    }

    pub fn with_encode_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.encode_issuer = Some(issuer.into());
        self
    }

    pub fn with_decode_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.decode_issuer = Some(issuer.into());
        self
    }

    pub fn with_decode_audience(mut self, audience: impl Into<Audience>) -> Self {
        self.decode_audience = Some(audience.into());
        self
    }

    /// Enable the revocation check for the given token types.
    pub fn with_blacklist<I>(mut self, checks: I) -> Self
    where
        I: IntoIterator<Item = TokenType>,
    {
        self.blacklist_enabled = true;
        self.blacklist_token_checks = checks.into_iter().collect();
        self
    }

    pub fn with_access_token_expires(mut self, lifetime: Option<Duration>) -> Self {
        self.access_token_expires = lifetime;
        self
    }

    pub fn with_refresh_token_expires(mut self, lifetime: Option<Duration>) -> Self {
        self.refresh_token_expires = lifetime;
        self
    }

    /// Algorithms accepted when decoding, falling back to the signing algorithm.
    pub fn allowed_algorithms(&self) -> Vec<Algorithm> {
        match &self.decode_algorithms {
            Some(algorithms) => algorithms.clone(),
            None => vec![self.algorithm],
        }
    }

    pub fn expiry_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy::new(self.access_token_expires, self.refresh_token_expires)
    }

    pub fn checks_blacklist_for(&self, token_type: TokenType) -> bool {
        self.blacklist_token_checks.contains(&token_type)
    }

    pub fn validate(&self) -> AuthResult<()> {
        if matches!(&self.decode_algorithms, Some(algorithms) if algorithms.is_empty()) {
            return Err(AuthError::config(
                "AUTHJWT_DECODE_ALGORITHMS must list at least one algorithm",
            ));
        }
        if let Some(Audience::Many(items)) = &self.decode_audience {
            if items.is_empty() {
                return Err(AuthError::config(
                    "AUTHJWT_DECODE_AUDIENCE must not be an empty list",
                ));
            }
        }
        for (name, lifetime) in [
            ("AUTHJWT_ACCESS_TOKEN_EXPIRES", self.access_token_expires),
            ("AUTHJWT_REFRESH_TOKEN_EXPIRES", self.refresh_token_expires),
        ] {
            if matches!(lifetime, Some(value) if value <= Duration::zero()) {
                return Err(AuthError::config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    /// Load from `AUTHJWT_*` environment variables.
    pub fn from_env() -> AuthResult<Self> {
        Self::from_pairs(env::vars().filter(|(key, _)| {
            key.to_ascii_lowercase().starts_with(ENV_PREFIX)
        }))
    }

    /// Load from `(key, value)` pairs. Keys are case-insensitive and may omit
    /// the `AUTHJWT_` prefix.
    pub fn from_pairs<I, K, V>(pairs: I) -> AuthResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in pairs {
            config.apply(key.as_ref(), value.as_ref())?;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> AuthResult<()> {
        let key = key.trim().to_ascii_lowercase();
        let name = key.strip_prefix(ENV_PREFIX).unwrap_or(&key);
        match name {
            "secret_key" => self.secret_key = normalize_optional(value),
            "public_key" => self.public_key = normalize_optional(value),
            "private_key" => self.private_key = normalize_optional(value),
            "algorithm" => self.algorithm = parse_algorithm(name, value)?,
            "decode_algorithms" => {
                self.decode_algorithms = Some(
                    parse_list(name, value)?
                        .iter()
                        .map(|item| parse_algorithm(name, item))
                        .collect::<AuthResult<Vec<_>>>()?,
                )
            }
            "decode_leeway" => {
                self.decode_leeway = value.trim().parse().map_err(|_| {
                    invalid_setting(name, value, "expected a non-negative integer")
                })?
            }
            "encode_issuer" => self.encode_issuer = normalize_optional(value),
            "decode_issuer" => self.decode_issuer = normalize_optional(value),
            "decode_audience" => {
                let mut items = parse_list(name, value)?;
                self.decode_audience = match items.len() {
                    0 => None,
                    1 => items.pop().map(Audience::Single),
                    _ => Some(Audience::Many(items)),
                }
            }
            "blacklist_enabled" => self.blacklist_enabled = value.trim() == "true",
            "blacklist_token_checks" => {
                self.blacklist_token_checks = parse_list(name, value)?
                    .iter()
                    .map(|item| {
                        TokenType::from_str(item)
                            .map_err(|_| invalid_setting(name, item, "expected access or refresh"))
                    })
                    .collect::<AuthResult<HashSet<_>>>()?
            }
            "access_token_expires" => self.access_token_expires = parse_lifetime(name, value)?,
            "refresh_token_expires" => self.refresh_token_expires = parse_lifetime(name, value)?,
            other => debug!(setting = other, "ignoring unknown token engine setting"),
        }
        Ok(())
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("EngineConfig")
            .field("secret_key", &redact(&self.secret_key))
            .field("public_key", &self.public_key.as_ref().map(|_| "<pem>"))
            .field("private_key", &redact(&self.private_key))
            .field("algorithm", &self.algorithm)
            .field("decode_algorithms", &self.decode_algorithms)
            .field("decode_leeway", &self.decode_leeway)
            .field("encode_issuer", &self.encode_issuer)
            .field("decode_issuer", &self.decode_issuer)
            .field("decode_audience", &self.decode_audience)
            .field("blacklist_enabled", &self.blacklist_enabled)
            .field("blacklist_token_checks", &self.blacklist_token_checks)
            .field("access_token_expires", &self.access_token_expires)
            .field("refresh_token_expires", &self.refresh_token_expires)
            .finish()
    }
}

fn invalid_setting(name: &str, value: &str, expected: &str) -> AuthError {
    AuthError::config(format!(
        "Invalid value '{value}' for AUTHJWT_{}: {expected}",
        name.to_ascii_uppercase()
    ))
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_algorithm(name: &str, value: &str) -> AuthResult<Algorithm> {
    Algorithm::from_str(value.trim())
        .map_err(|_| invalid_setting(name, value, "unsupported algorithm"))
}

/// Accepts a JSON array (`["a","b"]`) or a comma/whitespace separated list.
fn parse_list(name: &str, value: &str) -> AuthResult<Vec<String>> {
    let trimmed = value.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<String>>(trimmed)
            .map_err(|err| invalid_setting(name, value, &err.to_string()));
    }

    Ok(trimmed
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter_map(normalize_optional)
        .collect())
}

/// Integer seconds, or `false` to disable expiry.
fn parse_lifetime(name: &str, value: &str) -> AuthResult<Option<Duration>> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("false") {
        return Ok(None);
    }
    let seconds = trimmed
        .parse::<i64>()
        .map_err(|_| invalid_setting(name, value, "expected integer seconds or false"))?;
    Duration::try_seconds(seconds)
        .map(Some)
        .ok_or_else(|| invalid_setting(name, value, "lifetime is out of range"))
}
