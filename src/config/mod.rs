use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

// Re-export existing config types
pub use crate::spotify::SpotifyConfig;

/// Complete spotlink configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpotlinkConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Externally reachable base URL; the OAuth callback hangs off it
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Where the browser lands after the Spotify callback (also the CORS origin)
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    /// How long an OAuth state token stays valid (seconds)
    #[serde(default = "default_state_expiry")]
    pub state_expiry_seconds: i64,
    #[serde(default = "default_state_cleanup_interval")]
    pub state_cleanup_interval_seconds: u64,
    /// HS256 secret shared with the account service that signs session tokens
    #[serde(default)]
    pub jwt_secret: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_state_expiry() -> i64 {
    600
}

fn default_state_cleanup_interval() -> u64 {
    60
}

/// Upper bound for `state_expiry_seconds` (one day)
pub const MAX_STATE_EXPIRY_SECONDS: i64 = 86_400;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_base_url: default_public_base_url(),
            frontend_url: default_frontend_url(),
            state_expiry_seconds: default_state_expiry(),
            state_cleanup_interval_seconds: default_state_cleanup_interval(),
            jwt_secret: String::new(),
        }
    }
}

impl ServerConfig {
    /// Redirect URI registered with Spotify for the authorization callback.
    pub fn callback_url(&self) -> String {
        format!(
            "{}/api/users/spotify-auth-callback",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

/// Token storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "spotlink.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl SpotlinkConfig {
    /// Applies `SPOTLINK_*` environment variables on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SPOTLINK_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("SPOTLINK_PUBLIC_BASE_URL") {
            self.server.public_base_url = v;
        }
        if let Some(v) = lookup("SPOTLINK_FRONTEND_URL") {
            self.server.frontend_url = v;
        }
        if let Some(v) = lookup("SPOTLINK_JWT_SECRET") {
            self.server.jwt_secret = v;
        }
        if let Some(v) = lookup("SPOTLINK_SPOTIFY_CLIENT_ID") {
            self.spotify.client_id = v;
        }
        if let Some(v) = lookup("SPOTLINK_SPOTIFY_CLIENT_SECRET") {
            self.spotify.client_secret = v;
        }
        if let Some(v) = lookup("SPOTLINK_DATABASE_PATH") {
            self.storage.database_path = v;
        }
    }

    /// Checks the settings the server cannot start without.
    pub fn validate(&self) -> Result<()> {
        if self.spotify.client_id.trim().is_empty() {
            bail!("spotify.client_id is required (or set SPOTLINK_SPOTIFY_CLIENT_ID)");
        }
        if self.spotify.client_secret.trim().is_empty() {
            bail!("spotify.client_secret is required (or set SPOTLINK_SPOTIFY_CLIENT_SECRET)");
        }
        if self.server.jwt_secret.is_empty() {
            bail!("server.jwt_secret is required (or set SPOTLINK_JWT_SECRET)");
        }
        if self.server.state_expiry_seconds <= 0
            || self.server.state_expiry_seconds > MAX_STATE_EXPIRY_SECONDS
        {
            bail!(
                "server.state_expiry_seconds must be between 1 and {}",
                MAX_STATE_EXPIRY_SECONDS
            );
        }
        if self.server.state_cleanup_interval_seconds == 0 {
            bail!("server.state_cleanup_interval_seconds must be positive");
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SpotlinkConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: SpotlinkConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Loads `path` if it exists (defaults otherwise) and applies environment overrides.
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<SpotlinkConfig> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        load_config(path)?
    } else {
        SpotlinkConfig::default()
    };
    config.apply_env_overrides();
    Ok(config)
}
