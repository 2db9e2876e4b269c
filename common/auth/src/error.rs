use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::claims::TokenType;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The engine is misconfigured (missing key material, missing revocation check, bad settings).
    #[error("{0}")]
    Config(String),
    /// The caller handed the engine a value it cannot put into a token.
    #[error("{0}")]
    InvalidInput(String),
    /// The token failed verification. `reason` is surfaced verbatim to clients.
    #[error("{reason}")]
    Verification { reason: String },
    #[error("Missing Authorization Header")]
    MissingAuthorization,
    #[error("Bad Authorization header. Expected value 'Bearer <JWT>'")]
    InvalidAuthorization,
    #[error("Only {expected} tokens are allowed")]
    WrongTokenType { expected: TokenType },
    #[error("Fresh token required")]
    StaleToken,
    #[error("Token has been revoked")]
    Revoked,
}

impl AuthError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn verification(reason: impl Into<String>) -> Self {
        Self::Verification {
            reason: reason.into(),
        }
    }

    /// Verification reason, if this is a verification failure.
    pub fn reason(&self) -> Option<&str> {
        match self {
            AuthError::Verification { reason } => Some(reason),
            _ => None,
        }
    }

    /// Stable machine-readable code used in response bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Config(_) => "AUTH_CONFIG",
            AuthError::InvalidInput(_) => "AUTH_INPUT",
            AuthError::Verification { .. } => "AUTH_TOKEN",
            AuthError::MissingAuthorization | AuthError::InvalidAuthorization => "AUTH_HEADER",
            AuthError::WrongTokenType { .. } => "AUTH_TOKEN_TYPE",
            AuthError::StaleToken => "AUTH_FRESH",
            AuthError::Revoked => "AUTH_REVOKED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::MissingAuthorization | AuthError::StaleToken | AuthError::Revoked => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::InvalidAuthorization
            | AuthError::Verification { .. }
            | AuthError::WrongTokenType { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match value.kind() {
            ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::RsaFailedSigning
            | ErrorKind::MissingAlgorithm => Self::Config(value.to_string()),
            ErrorKind::InvalidSignature => Self::verification("Signature verification failed"),
            ErrorKind::InvalidAlgorithm => {
                Self::verification("The specified alg value is not allowed")
            }
            ErrorKind::InvalidAlgorithmName => Self::verification("Algorithm not supported"),
            _ => Self::verification(value.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
