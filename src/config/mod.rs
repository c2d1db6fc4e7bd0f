//! Configuration module for the App Forge backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AppError;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_TOAST_TTL_MS: u64 = 3000;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Root of the deployment directories served by local hosting
    pub sites_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Base URL hosted sites are published under
    pub public_url: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// OpenAI-compatible chat endpoint
    pub chat_api_url: String,
    pub chat_api_key: Option<String>,
    /// Model used when a create request names none
    pub default_model: String,
    /// Platform user; an empty value means no session
    pub platform_user: Option<String>,
    pub toast_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("FORGE_API_PSK").ok().filter(|s| !s.is_empty());

        let db_path = env::var("FORGE_DB_PATH")
            .unwrap_or_else(|_| "./data/forge.sqlite".to_string())
            .into();

        let index_path = env::var("FORGE_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let sites_path = env::var("FORGE_SITES_PATH")
            .unwrap_or_else(|_| "./data/sites".to_string())
            .into();

        let bind_addr: SocketAddr = env::var("FORGE_BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|e| AppError::Validation(format!("Invalid FORGE_BIND_ADDR format: {}", e)))?;

        let public_url =
            env::var("FORGE_PUBLIC_URL").unwrap_or_else(|_| format!("http://{}", bind_addr));

        let log_level = env::var("FORGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let chat_api_url = env::var("FORGE_CHAT_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let chat_api_key = env::var("FORGE_CHAT_API_KEY").ok().filter(|s| !s.is_empty());

        let default_model =
            env::var("FORGE_DEFAULT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let platform_user = match env::var("FORGE_PLATFORM_USER") {
            Ok(user) if user.trim().is_empty() => None,
            Ok(user) => Some(user),
            Err(_) => Some("local".to_string()),
        };

        let toast_ttl_ms = match env::var("FORGE_TOAST_TTL_MS") {
            Ok(raw) => raw.parse().map_err(|e| {
                AppError::Validation(format!("Invalid FORGE_TOAST_TTL_MS value: {}", e))
            })?,
            Err(_) => DEFAULT_TOAST_TTL_MS,
        };

        Ok(Self {
            api_psk,
            db_path,
            index_path,
            sites_path,
            bind_addr,
            public_url,
            log_level,
            chat_api_url,
            chat_api_key,
            default_model,
            platform_user,
            toast_ttl: Duration::from_millis(toast_ttl_ms),
        })
    }
}
