//! Token lifecycle manager.
//!
//! Hands out an access token that is valid right now, refreshing it through
//! the provider when the stored one has expired.

use super::{
    Clock, ConnectionState, ProviderClient, SystemClock, TokenError, TokenGrant, TokenRecord,
    TokenStore,
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};


/// Decides whether a user's stored access token is still usable and refreshes
/// it when it is not.
///
/// # Concurrency
/// Refreshes for the same user are serialized by a per-user async lock. A
/// caller that waited on the lock re-reads the record and returns the token
/// the previous holder stored instead of refreshing again. The cheap path
/// (stored token still valid) takes no lock. A user's lock is dropped from
/// the map when its last holder finishes.
///
/// The lock only covers this process. Two processes sharing a database can
/// still refresh the same user concurrently; the last write wins.
pub struct TokenLifecycleManager {
    store: Arc<dyn TokenStore>,
    provider: Arc<dyn ProviderClient>,
    clock: Arc<dyn Clock>,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TokenLifecycleManager {
    pub fn new(store: Arc<dyn TokenStore>, provider: Arc<dyn ProviderClient>) -> Self {
        Self {
            store,
            provider,
            clock: Arc::new(SystemClock),
            refresh_locks: DashMap::new(),
        }
    }

    /// Replaces the wall clock used for expiry decisions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns an access token that is valid at the time of the call.
    ///
    /// # Returns
    /// * `Ok(token)` - The stored token if unexpired, otherwise a freshly refreshed one
    /// * `Err(NotConnected)` - The user never completed authorization
    /// * `Err(RefreshFailed)` - The provider rejected the refresh
    /// * `Err(PersistenceFailure)` - The refreshed tokens could not be stored
    pub async fn get_valid_token(&self, user_id: &str) -> Result<String, TokenError> {
        let record = self.load(user_id)?;
        if let Some(token) = record.valid_access_token(self.clock.now()) {
            debug!(user_id = %user_id, "Stored access token still valid");
            return Ok(token.to_string());
        }
        if record.refresh_token.is_none() {
            return Err(TokenError::not_connected(user_id));
        }

        let lock = self.refresh_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked(user_id).await
        };
        self.release_refresh_lock(user_id, lock);
        result
    }

    /// Refresh path of `get_valid_token`; the caller holds the user's lock.
    async fn refresh_locked(&self, user_id: &str) -> Result<String, TokenError> {
        // Another caller may have refreshed while we waited for the lock
        let record = self.load(user_id)?;
        if let Some(token) = record.valid_access_token(self.clock.now()) {
            debug!(user_id = %user_id, "Access token refreshed by concurrent caller");
            return Ok(token.to_string());
        }
        let refresh_token = record
            .refresh_token
            .clone()
            .ok_or_else(|| TokenError::not_connected(user_id))?;

        debug!(user_id = %user_id, "Access token expired, refreshing");

        let grant = self.provider.refresh(&refresh_token).await.map_err(|e| {
            error!(user_id = %user_id, error = %e, "Access token refresh failed");
            TokenError::RefreshFailed(format!("{:#}", e))
        })?;

        let access_token = grant.access_token.clone();
        let expires_in = grant.expires_in;
        let refreshed = self
            .record_from_grant(grant, record.refresh_token)
            .ok_or_else(|| {
                TokenError::RefreshFailed(format!(
                    "provider returned out-of-range expires_in {}",
                    expires_in
                ))
            })?;
        self.persist(user_id, &refreshed)?;

        info!(user_id = %user_id, "Access token refreshed");
        Ok(access_token)
    }

    /// Exchanges a one-time authorization code for the user's first token set
    /// and stores it. Repeating this for a connected user replaces their tokens.
    ///
    /// # Arguments
    /// * `user_id` - User completing the connect flow
    /// * `code` - Authorization code from the provider callback
    /// * `redirect_uri` - Must match the redirect URI of the authorization request
    pub async fn complete_authorization(
        &self,
        user_id: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<(), TokenError> {
        debug!(user_id = %user_id, "Exchanging authorization code");

        let grant = self
            .provider
            .exchange_code(code, redirect_uri)
            .await
            .map_err(|e| {
                error!(user_id = %user_id, error = %e, "Authorization code exchange failed");
                TokenError::AuthorizationExchangeFailed(format!("{:#}", e))
            })?;

        let lock = self.refresh_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            self.store_authorization(user_id, grant)
        };
        self.release_refresh_lock(user_id, lock);
        result
    }

    /// Stores the tokens of an authorization grant; the caller holds the user's lock.
    fn store_authorization(&self, user_id: &str, grant: TokenGrant) -> Result<(), TokenError> {
        let previous = if grant.refresh_token.is_some() {
            None
        } else {
            self.load(user_id)?.refresh_token
        };
        if grant.refresh_token.is_none() && previous.is_none() {
            return Err(TokenError::AuthorizationExchangeFailed(
                "provider did not issue a refresh token".to_string(),
            ));
        }

        let expires_in = grant.expires_in;
        let record = self.record_from_grant(grant, previous).ok_or_else(|| {
            TokenError::AuthorizationExchangeFailed(format!(
                "provider returned out-of-range expires_in {}",
                expires_in
            ))
        })?;
        self.persist(user_id, &record)?;

        info!(user_id = %user_id, "Spotify account connected");
        Ok(())
    }

    /// Reports the user's lifecycle state without touching the network.
    pub fn connection_state(&self, user_id: &str) -> Result<ConnectionState, TokenError> {
        Ok(self.load(user_id)?.state(self.clock.now()))
    }

    fn load(&self, user_id: &str) -> Result<TokenRecord, TokenError> {
        self.store.read(user_id).map_err(|e| {
            error!(user_id = %user_id, error = %e, "Failed to read token record");
            TokenError::StoreReadFailed(format!("{:#}", e))
        })
    }

    /// Builds the record for a grant, carrying `previous_refresh_token`
    /// forward when the provider did not issue a new one. `None` when
    /// `expires_in` cannot be turned into a timestamp.
    fn record_from_grant(
        &self,
        grant: TokenGrant,
        previous_refresh_token: Option<String>,
    ) -> Option<TokenRecord> {
        let expires_after = grant.expires_after(self.clock.now())?;
        Some(TokenRecord {
            access_token: Some(grant.access_token),
            refresh_token: grant.refresh_token.or(previous_refresh_token),
            access_token_expires_after: Some(expires_after),
        })
    }

    fn persist(&self, user_id: &str, record: &TokenRecord) -> Result<(), TokenError> {
        self.store.write(user_id, record).map_err(|e| {
            error!(
                user_id = %user_id,
                error = %e,
                "Failed to persist issued tokens; they are lost if the provider rotated the refresh token"
            );
            TokenError::PersistenceFailure(format!("{:#}", e))
        })
    }

    fn refresh_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    /// Drops the user's lock from the map once nobody else holds or waits on it.
    ///
    /// The count check runs under the shard lock that `refresh_lock` also
    /// takes, so a handle cannot be cloned out between check and removal.
    fn release_refresh_lock(&self, user_id: &str, lock: Arc<Mutex<()>>) {
        self.refresh_locks
            .remove_if(user_id, |_, entry| Arc::strong_count(entry) == 2);
        drop(lock);
    }
}
