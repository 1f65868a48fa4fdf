//! Spotify OAuth token lifecycle.
//!
//! Acquires, persists, expires and transparently refreshes a user's Spotify
//! access token so callers can ask for "a token that works right now".
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       TokenLifecycleManager              │
//! │  - cheap path: stored token still valid  │
//! │  - refresh path: serialized per user     │
//! └─────────────────────────────────────────┘
//!      ↓ read/write       ↓ exchange      ↓ now()
//! ┌──────────────┐ ┌────────────────┐ ┌─────────┐
//! │  TokenStore  │ │ ProviderClient │ │  Clock  │
//! │  (SQLite)    │ │ (Spotify)      │ │         │
//! └──────────────┘ └────────────────┘ └─────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use spotlink::config::SpotifyConfig;
//! use spotlink::spotify::SpotifyClient;
//! use spotlink::tokens::{SqliteTokenStore, TokenLifecycleManager};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let store = Arc::new(SqliteTokenStore::new("spotlink.db")?);
//! let spotify = Arc::new(SpotifyClient::new(SpotifyConfig::default()));
//! let manager = TokenLifecycleManager::new(store, spotify);
//!
//! manager
//!     .complete_authorization("user1", "code-from-callback", "http://localhost:8080/cb")
//!     .await?;
//! let access_token = manager.get_valid_token("user1").await?;
//! # let _ = access_token;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

mod clock;
mod error;
mod manager;
mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TokenError;
pub use manager::TokenLifecycleManager;
pub use storage::SqliteTokenStore;

/// The Spotify token fields of a user record.
///
/// Every field is absent until the user completes the authorization code
/// exchange once. An access token is never stored without its expiry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenRecord {
    /// Bearer token for the Spotify Web API
    pub access_token: Option<String>,

    /// Long-lived credential used to mint new access tokens
    pub refresh_token: Option<String>,

    /// Instant after which `access_token` must not be used (UTC)
    pub access_token_expires_after: Option<DateTime<Utc>>,
}

impl TokenRecord {
    /// Returns the stored access token if its expiry is strictly later than `now`.
    pub fn valid_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.access_token, &self.access_token_expires_after) {
            (Some(token), Some(expires_after)) if *expires_after > now => Some(token),
            _ => None,
        }
    }

    pub fn state(&self, now: DateTime<Utc>) -> ConnectionState {
        if self.refresh_token.is_none() {
            ConnectionState::Unconnected
        } else if self.valid_access_token(now).is_some() {
            ConnectionState::ConnectedValid
        } else {
            ConnectionState::ConnectedExpired
        }
    }
}

/// Where a user sits in the token lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Authorization never completed; no refresh token exists
    Unconnected,
    /// Access token present and unexpired
    ConnectedValid,
    /// Refresh token present, access token missing or expired
    ConnectedExpired,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        !matches!(self, ConnectionState::Unconnected)
    }
}

/// Tokens issued by the provider for either grant type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,

    /// Absent when the provider keeps the previous refresh token valid
    pub refresh_token: Option<String>,

    /// Lifetime of `access_token` in seconds
    pub expires_in: i64,
}

impl TokenGrant {
    /// Absolute expiry of the granted access token, `None` if `expires_in` is out of range.
    pub fn expires_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Duration::try_seconds(self.expires_in).and_then(|lifetime| now.checked_add_signed(lifetime))
    }
}

/// Persisted per-user token records.
///
/// `read` of an unknown user returns an empty record. Both calls are atomic on
/// their own but are not linked to each other; callers that need
/// read-check-write consistency must serialize themselves.
pub trait TokenStore: Send + Sync {
    fn read(&self, user_id: &str) -> Result<TokenRecord>;
    fn write(&self, user_id: &str, record: &TokenRecord) -> Result<()>;
}

/// The two OAuth 2.0 exchanges against the provider's token endpoint.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Authorization code grant.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant>;

    /// Refresh token grant.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}
