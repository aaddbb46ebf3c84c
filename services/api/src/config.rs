//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. Everything is validated eagerly so a
//! misconfigured process fails at boot, not on the first request.

use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// `development` or `production`; gates how much detail internal errors leak.
    pub environment: String,
    /// Public origin used for permanent links, e.g. `https://ctxt.help`.
    pub site_base_url: String,
    /// Base URL of the external markdown extraction service.
    pub reader_base_url: String,
    pub reader_timeout_secs: u64,
    /// Daily conversion quota for the free tier.
    pub free_daily_limit: u32,
    /// Shared secret for billing webhook signatures. Webhooks are rejected
    /// when unset.
    pub billing_webhook_secret: Option<String>,
    pub allowed_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        // --- Public Addressing ---
        let site_base_url = std::env::var("SITE_BASE_URL")
            .unwrap_or_else(|_| "https://ctxt.help".to_string())
            .trim_end_matches('/')
            .to_string();

        // --- External Extraction Service ---
        let reader_base_url = std::env::var("READER_BASE_URL")
            .unwrap_or_else(|_| "https://r.jina.ai".to_string())
            .trim_end_matches('/')
            .to_string();

        let reader_timeout_str =
            std::env::var("READER_TIMEOUT_SECS").unwrap_or_else(|_| "30".to_string());
        let reader_timeout_secs = reader_timeout_str.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(
                "READER_TIMEOUT_SECS".to_string(),
                format!("'{}' is not a valid number of seconds", reader_timeout_str),
            )
        })?;

        // --- Rate Limiting ---
        let free_limit_str =
            std::env::var("RATE_LIMIT_FREE_DAILY").unwrap_or_else(|_| "5".to_string());
        let free_daily_limit = free_limit_str.parse::<u32>().map_err(|_| {
            ConfigError::InvalidValue(
                "RATE_LIMIT_FREE_DAILY".to_string(),
                format!("'{}' is not a valid limit", free_limit_str),
            )
        })?;

        // --- Billing ---
        let billing_webhook_secret = std::env::var("BILLING_WEBHOOK_SECRET").ok();

        // --- CORS ---
        let allowed_origin = std::env::var("ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            environment,
            site_base_url,
            reader_base_url,
            reader_timeout_secs,
            free_daily_limit,
            billing_webhook_secret,
            allowed_origin,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}
