use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Secrets shipped in sample `.env` files. Refused at startup.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
    "secret",
];

const DEFAULT_TOKEN_TTL_DAYS: i64 = 15;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

impl Config {
    /// Read `PLAZA_*` variables from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = var("PLAZA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PLAZA_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let host = var("PLAZA_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("PLAZA_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("PLAZA_PORT must be a port number")?;
        let db_path = PathBuf::from(var("PLAZA_DB_PATH").unwrap_or_else(|| "plaza.db".into()));
        let ttl_days: i64 = match var("PLAZA_TOKEN_TTL_DAYS") {
            Some(raw) => raw
                .parse()
                .context("PLAZA_TOKEN_TTL_DAYS must be a whole number of days")?,
            None => DEFAULT_TOKEN_TTL_DAYS,
        };
        if ttl_days <= 0 {
            bail!("PLAZA_TOKEN_TTL_DAYS must be positive");
        }

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            token_ttl: chrono::Duration::days(ttl_days),
        })
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
