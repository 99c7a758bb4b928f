use std::net::SocketAddr;

use secrecy::SecretString;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
///
/// The signing pair is optional on purpose: the service still boots
/// without it (local/dev mode), the token route answers 500 until it is
/// configured, and the webhook falls back to unverified parsing.
#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Transport endpoint handed to clients alongside their token.
    pub transport_url: String,
    pub signing_key: Option<String>,
    pub signing_secret: Option<SecretString>,
    /// Agent to place into new rooms. None disables dispatch entirely.
    pub agent_name: Option<String>,
    /// Embed the dispatch directive in the token instead of dispatching
    /// from the webhook when a participant joins.
    pub embed_dispatch: bool,
    pub token_ttl_seconds: i64,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// *   `BIND_ADDRESS`: Address and port to bind (default "0.0.0.0:3000").
    /// *   `TRANSPORT_URL`: The media cloud endpoint clients connect to. Required.
    /// *   `SIGNING_KEY` / `SIGNING_SECRET`: Credential signing pair. Optional;
    ///     without them token minting fails and webhooks go unverified.
    /// *   `AGENT_NAME`: (Optional) Agent to dispatch into new rooms.
    /// *   `EMBED_DISPATCH`: (Optional) "true" to embed dispatch in the token
    ///     rather than dispatching on webhook. Defaults to "true".
    /// *   `TOKEN_TTL_SECONDS`: (Optional) Credential lifetime. Defaults to 900.
    /// *   `RUST_LOG`: (Optional) Logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let transport_url = std::env::var("TRANSPORT_URL")
            .map_err(|_| ConfigError::MissingVar("TRANSPORT_URL".to_string()))?;

        let signing_key = std::env::var("SIGNING_KEY").ok().filter(|v| !v.is_empty());
        let signing_secret = std::env::var("SIGNING_SECRET")
            .ok()
            .filter(|v| !v.is_empty())
            .map(SecretString::from);
        if signing_key.is_some() != signing_secret.is_some() {
            return Err(ConfigError::InvalidValue(
                "SIGNING_KEY/SIGNING_SECRET".to_string(),
                "both or neither must be set".to_string(),
            ));
        }

        let agent_name = std::env::var("AGENT_NAME").ok().filter(|v| !v.is_empty());

        let embed_dispatch = std::env::var("EMBED_DISPATCH")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let token_ttl_seconds = match std::env::var("TOKEN_TTL_SECONDS") {
            Ok(raw) => raw.parse::<i64>().map_err(|e| {
                ConfigError::InvalidValue("TOKEN_TTL_SECONDS".to_string(), e.to_string())
            })?,
            Err(_) => voxcoach_token::DEFAULT_TTL_SECONDS,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            transport_url,
            signing_key,
            signing_secret,
            agent_name,
            embed_dispatch,
            token_ttl_seconds,
            log_level,
        })
    }
}
