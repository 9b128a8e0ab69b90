use serde::Deserialize;
use std::env;
use std::str::FromStr;
use tidemark_common::error::{TidemarkError, TidemarkResult};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl AppConfig {
    /// Read process settings, after merging a `.env` file when one exists.
    pub fn from_env() -> TidemarkResult<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: required_var("DATABASE_URL")?,
            host: var_or("HOST", "0.0.0.0"),
            port: var_or("PORT", "8080")
                .parse()
                .map_err(|e| TidemarkError::Config(format!("invalid PORT: {e}")))?,
            log_level: var_or("LOG_LEVEL", "info"),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse an optional env var, falling back to `default` when unset or unparsable.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a boolean flag. Accepts `1/0`, `true/false`, `yes/no`, `on/off`.
pub fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key).map(|v| v.trim().to_ascii_lowercase()) {
        Ok(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Ok(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn required_var(key: &str) -> TidemarkResult<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(TidemarkError::Config(format!("{key} must be set"))),
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_owned())
}
