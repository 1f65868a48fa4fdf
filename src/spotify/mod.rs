//! Spotify accounts service and Web API client.
//!
//! Implements the authorization code flow used to connect a user's Spotify
//! account:
//! 1. Frontend calls GET /api/users/connect-spotify → receives the authorization URL
//! 2. User authorizes on accounts.spotify.com
//! 3. Spotify redirects to /api/users/spotify-auth-callback
//! 4. Code is exchanged for tokens, which are stored per user
//! 5. Later requests obtain a valid access token (refreshing as needed) and
//!    call the Web API

mod exchange;
mod player;

pub use player::ListeningTo;

use serde::Deserialize;
use std::fmt;

/// Spotify application configuration.
#[derive(Clone, Deserialize)]
pub struct SpotifyConfig {
    /// Client ID of the registered Spotify application
    #[serde(default)]
    pub client_id: String,

    /// Client secret of the registered Spotify application
    #[serde(default)]
    pub client_secret: String,

    /// Authorization endpoint the user is sent to
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,

    /// Token endpoint for code and refresh exchanges
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Web API base URL (no trailing slash)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Scopes requested during authorization
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_authorize_url() -> String {
    "https://accounts.spotify.com/authorize".to_string()
}

fn default_token_url() -> String {
    "https://accounts.spotify.com/api/token".to_string()
}

fn default_api_base_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["user-read-recently-played".to_string()]
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            api_base_url: default_api_base_url(),
            scopes: default_scopes(),
        }
    }
}

// Keeps the client secret out of logs
impl fmt::Debug for SpotifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("api_base_url", &self.api_base_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// HTTP client for the Spotify accounts service and Web API.
///
/// Implements [`ProviderClient`](crate::tokens::ProviderClient) for the token
/// lifecycle manager. Requests use reqwest's default timeouts.
#[derive(Clone, Debug)]
pub struct SpotifyClient {
    http: reqwest::Client,
    config: SpotifyConfig,
}

impl SpotifyClient {
    pub fn new(config: SpotifyConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Builds the URL the user visits to grant access.
    pub fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        let scopes = self.config.scopes.join(" ");
        format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}",
            self.config.authorize_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }
}
