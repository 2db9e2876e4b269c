use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use jwt_auth::TokenType;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct AuthMetrics {
    registry: Registry,
    tokens_issued: IntCounterVec,
    token_rejections: IntCounterVec,
}

impl AuthMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let tokens_issued = IntCounterVec::new(
            Opts::new(
                "auth_tokens_issued_total",
                "Count of tokens issued grouped by token type",
            ),
            &["type"],
        )?;
        registry.register(Box::new(tokens_issued.clone()))?;

        let token_rejections = IntCounterVec::new(
            Opts::new(
                "auth_token_rejections_total",
                "Count of rejected credentials grouped by error code",
            ),
            &["code"],
        )?;
        registry.register(Box::new(token_rejections.clone()))?;

        Ok(Self {
            registry,
            tokens_issued,
            token_rejections,
        })
    }

    pub fn token_issued(&self, token_type: TokenType) {
        self.tokens_issued
            .with_label_values(&[token_type.as_str()])
            .inc();
    }

    pub fn token_rejected(&self, code: &str) {
        self.token_rejections.with_label_values(&[code]).inc();
    }

    pub fn issued_count(&self, token_type: TokenType) -> u64 {
        self.tokens_issued
            .with_label_values(&[token_type.as_str()])
            .get()
    }

    pub fn rejected_count(&self, code: &str) -> u64 {
        self.token_rejections.with_label_values(&[code]).get()
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))?;
        Ok(response)
    }
}
