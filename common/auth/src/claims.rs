use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

/// Which half of a token pair a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = AuthError;

    fn from_str(value: &str) -> AuthResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "access" => Ok(TokenType::Access),
            "refresh" => Ok(TokenType::Refresh),
            other => Err(AuthError::invalid_input(format!(
                "token type must be 'access' or 'refresh', got '{other}'"
            ))),
        }
    }
}

/// Subject of a token: a username-like string or a numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    Int(i64),
    Str(String),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Int(value) => write!(f, "{value}"),
            Identity::Str(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Identity::Str(value.to_owned())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Identity::Str(value)
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Identity::Int(value)
    }
}

impl From<i32> for Identity {
    fn from(value: i32) -> Self {
        Identity::Int(value.into())
    }
}

impl TryFrom<Value> for Identity {
    type Error = AuthError;

    fn try_from(value: Value) -> AuthResult<Self> {
        match value {
            Value::String(item) => Ok(Identity::Str(item)),
            Value::Number(number) => number
                .as_i64()
                .map(Identity::Int)
                .ok_or_else(|| AuthError::invalid_input("identity must be a string or integer")),
            _ => Err(AuthError::invalid_input(
                "identity must be a string or integer",
            )),
        }
    }
}

/// The `aud` claim: a single audience or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn values(&self) -> Vec<&str> {
        match self {
            Audience::Single(item) => vec![item.as_str()],
            Audience::Many(items) => items.iter().map(String::as_str).collect(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Audience::Single(item) => item.is_empty(),
            Audience::Many(items) => items.is_empty(),
        }
    }
}

impl From<&str> for Audience {
    fn from(value: &str) -> Self {
        Audience::Single(value.to_owned())
    }
}

impl From<String> for Audience {
    fn from(value: String) -> Self {
        Audience::Single(value)
    }
}

impl From<Vec<String>> for Audience {
    fn from(value: Vec<String>) -> Self {
        Audience::Many(value)
    }
}

impl From<&[&str]> for Audience {
    fn from(value: &[&str]) -> Self {
        Audience::Many(value.iter().map(|item| item.to_string()).collect())
    }
}

impl TryFrom<Value> for Audience {
    type Error = AuthError;

    fn try_from(value: Value) -> AuthResult<Self> {
        match value {
            Value::String(item) => Ok(Audience::Single(item)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(entry) => Ok(entry),
                    _ => Err(AuthError::invalid_input(
                        "audience must be a string or sequence",
                    )),
                })
                .collect::<AuthResult<Vec<_>>>()
                .map(Audience::Many),
            _ => Err(AuthError::invalid_input(
                "audience must be a string or sequence",
            )),
        }
    }
}

/// Claim set carried by every token the engine issues.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claims {
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    pub identity: Identity,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fresh: Option<bool>,
}

impl Claims {
    /// Assemble the claim set for a new token. Absent optional claims are left
    /// out of the payload entirely.
    pub fn build(
        identity: Identity,
        token_type: TokenType,
        fresh: Option<bool>,
        exp: Option<i64>,
        issuer: Option<&str>,
        audience: Option<Audience>,
    ) -> AuthResult<Self> {
        let fresh = match (token_type, fresh) {
            (TokenType::Access, fresh) => Some(fresh.unwrap_or(false)),
            (TokenType::Refresh, None) => None,
            (TokenType::Refresh, Some(_)) => {
                return Err(AuthError::invalid_input(
                    "fresh can only be set on access tokens",
                ))
            }
        };

        let now = Utc::now().timestamp();
        Ok(Self {
            iat: now,
            nbf: now,
            jti: Uuid::new_v4().to_string(),
            exp,
            iss: issuer.filter(|value| !value.is_empty()).map(str::to_owned),
            aud: audience.filter(|value| !value.is_empty()),
            identity,
            token_type,
            fresh,
        })
    }

    /// Decode a raw payload. Performs no signature check of any kind.
    pub fn parse(raw: &[u8]) -> AuthResult<Self> {
        let repr: ClaimsRepr = serde_json::from_slice(raw)
            .map_err(|err| AuthError::verification(format!("Invalid payload string: {err}")))?;
        Claims::try_from(repr)
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh.unwrap_or(false)
    }

    pub fn to_value(&self) -> AuthResult<Value> {
        serde_json::to_value(self)
            .map_err(|err| AuthError::invalid_input(format!("unserializable claims: {err}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClaimsRepr {
    iat: i64,
    nbf: i64,
    jti: String,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
    identity: Identity,
    #[serde(rename = "type")]
    token_type: TokenType,
    #[serde(default)]
    fresh: Option<bool>,
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = AuthError;

    fn try_from(value: ClaimsRepr) -> AuthResult<Self> {
        let fresh = match (value.token_type, value.fresh) {
            (TokenType::Access, fresh) => Some(fresh.unwrap_or(false)),
            (TokenType::Refresh, None) => None,
            (TokenType::Refresh, Some(_)) => {
                return Err(AuthError::verification(
                    "Invalid payload string: refresh tokens cannot carry a fresh claim",
                ))
            }
        };

        Ok(Self {
            iat: value.iat,
            nbf: value.nbf,
            jti: value.jti,
            exp: value.exp,
            iss: value.iss,
            aud: value.aud,
            identity: value.identity,
            token_type: value.token_type,
            fresh,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_access_claims_omits_absent_optionals() {
        let claims = Claims::build(
            Identity::from("test"),
            TokenType::Access,
            None,
            None,
            None,
            None,
        )
        .expect("claims");

        let value = claims.to_value().expect("claims value");
        let object = value.as_object().expect("object");
        assert_eq!(object["identity"], json!("test"));
        assert_eq!(object["type"], json!("access"));
        assert_eq!(object["fresh"], json!(false));
        assert!(!object.contains_key("exp"));
        assert!(!object.contains_key("iss"));
        assert!(!object.contains_key("aud"));
        assert_eq!(claims.iat, claims.nbf);
    }

    #[test]
    fn build_refresh_claims_has_no_fresh_flag() {
        let claims = Claims::build(
            Identity::from(7),
            TokenType::Refresh,
            None,
            Some(10),
            Some("urn:issuer"),
            Some(Audience::from("svc")),
        )
        .expect("claims");

        let value = claims.to_value().expect("claims value");
        assert!(value.get("fresh").is_none());
        assert_eq!(value["identity"], json!(7));
        assert_eq!(value["exp"], json!(10));
        assert_eq!(value["iss"], json!("urn:issuer"));
        assert_eq!(value["aud"], json!("svc"));
    }

    #[test]
    fn build_rejects_fresh_on_refresh() {
        let err = Claims::build(
            Identity::from("test"),
            TokenType::Refresh,
            Some(true),
            None,
            None,
            None,
        )
        .expect_err("fresh refresh token");
        assert!(matches!(err, AuthError::InvalidInput(_)));
    }

    #[test]
    fn empty_issuer_and_audience_are_treated_as_absent() {
        let claims = Claims::build(
            Identity::from("test"),
            TokenType::Access,
            Some(true),
            None,
            Some(""),
            Some(Audience::Many(Vec::new())),
        )
        .expect("claims");
        assert!(claims.iss.is_none());
        assert!(claims.aud.is_none());
    }

    #[test]
    fn jti_is_unique_per_build() {
        let first = Claims::build(Identity::from(1), TokenType::Access, None, None, None, None)
            .expect("claims");
        let second = Claims::build(Identity::from(1), TokenType::Access, None, None, None, None)
            .expect("claims");
        assert_ne!(first.jti, second.jti);
    }

    #[test]
    fn identity_and_audience_reject_wrong_json_types() {
        assert!(matches!(
            Identity::try_from(json!(1.5)),
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            Identity::try_from(json!({"id": 1})),
            Err(AuthError::InvalidInput(_))
        ));
        assert_eq!(
            Identity::try_from(json!(42)).expect("int identity"),
            Identity::Int(42)
        );
        assert!(matches!(
            Audience::try_from(json!(["ok", 3])),
            Err(AuthError::InvalidInput(_))
        ));
        assert_eq!(
            Audience::try_from(json!(["a", "b"])).expect("audience"),
            Audience::Many(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        let raw = json!({
            "iat": 1, "nbf": 1, "jti": "abc", "identity": "x",
            "type": "access", "fresh": true, "role": "admin"
        });
        let err = Claims::parse(raw.to_string().as_bytes()).expect_err("unknown field");
        let reason = err.reason().expect("verification failure");
        assert!(reason.starts_with("Invalid payload string"));
        assert!(reason.contains("role"));
    }

    #[test]
    fn parse_defaults_missing_fresh_to_false() {
        let raw = json!({
            "iat": 1, "nbf": 1, "jti": "abc", "identity": 3, "type": "access"
        });
        let claims = Claims::parse(raw.to_string().as_bytes()).expect("claims");
        assert_eq!(claims.fresh, Some(false));
        assert!(!claims.is_fresh());
        assert_eq!(claims.identity, Identity::Int(3));
    }

    #[test]
    fn parse_rejects_fresh_on_refresh() {
        let raw = json!({
            "iat": 1, "nbf": 1, "jti": "abc", "identity": "x",
            "type": "refresh", "fresh": false
        });
        assert!(Claims::parse(raw.to_string().as_bytes()).is_err());
    }

    #[test]
    fn token_type_parses_case_insensitively() {
        assert_eq!("Access".parse::<TokenType>().expect("type"), TokenType::Access);
        assert_eq!(" refresh ".parse::<TokenType>().expect("type"), TokenType::Refresh);
        assert!("id".parse::<TokenType>().is_err());
    }
}
