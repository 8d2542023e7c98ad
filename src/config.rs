//! Process configuration, read once at startup from the environment.
//!
//! A `.env` file in the working directory is honored through `dotenv`.

use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://meroghar.db?mode=rwc";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8080";
pub const DEFAULT_CLIENT_SECRETS: &str = "client_secret.json";
pub const DEFAULT_RUST_LOG: &str = "meroghar=debug,tower_http=info";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bind_addr: SocketAddr,
    /// Origin the site is reachable at; used for OAuth redirects, CORS and the sitemap.
    pub public_url: String,
    pub client_secrets: PathBuf,
    pub rust_log: String,
    pub session_idle_minutes: i64,
    pub feed_capacity: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        let bind_addr = var("BIND_ADDR", DEFAULT_BIND_ADDR);
        let public_url = var("PUBLIC_URL", DEFAULT_PUBLIC_URL)
            .trim_end_matches('/')
            .to_owned();

        Ok(Config {
            database_url: var("DATABASE_URL", DEFAULT_DATABASE_URL),
            db_max_connections: var("DB_MAX_CONNECTIONS", "16")
                .parse()
                .context("DB_MAX_CONNECTIONS must be a positive integer")?,
            bind_addr: bind_addr
                .parse()
                .with_context(|| format!("BIND_ADDR {bind_addr} is not a socket address"))?,
            public_url,
            client_secrets: PathBuf::from(var("CLIENT_SECRETS", DEFAULT_CLIENT_SECRETS)),
            rust_log: var("RUST_LOG", DEFAULT_RUST_LOG),
            session_idle_minutes: var("SESSION_IDLE_MINUTES", "60")
                .parse()
                .context("SESSION_IDLE_MINUTES must be an integer")?,
            feed_capacity: var("FEED_CAPACITY", "256")
                .parse()
                .context("FEED_CAPACITY must be a positive integer")?,
        })
    }
}
