use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub demo_username: String,
    pub demo_password: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8085,
            demo_username: "test".to_string(),
            demo_password: "test".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn accepts(&self, username: &str, password: &str) -> bool {
        self.demo_username == username && self.demo_password == password
    }
}

pub fn load_service_config() -> Result<ServiceConfig> {
    let defaults = ServiceConfig::default();

    let host = env::var("HOST")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .unwrap_or(defaults.host);

    let port = env::var("PORT")
        .ok()
        .map(|value| parse_port(&value))
        .transpose()
        .context("Failed to parse PORT")?
        .unwrap_or(defaults.port);

    let demo_username = env::var("AUTH_DEMO_USERNAME")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .unwrap_or(defaults.demo_username);
    let demo_password = env::var("AUTH_DEMO_PASSWORD")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .unwrap_or(defaults.demo_password);

    Ok(ServiceConfig {
        host,
        port,
        demo_username,
        demo_password,
    })
}

fn parse_port(value: &str) -> Result<u16> {
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid port '{}'", value.trim()))
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
