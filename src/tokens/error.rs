use thiserror::Error;

/// Outcome of a failed token lifecycle operation.
///
/// Every variant propagates to the immediate caller; nothing is retried.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The user never completed authorization, so no refresh token exists.
    #[error("user '{user_id}' has not connected a Spotify account")]
    NotConnected { user_id: String },

    /// The provider rejected the authorization code (invalid, expired or
    /// redirect URI mismatch).
    #[error("authorization code exchange failed: {0}")]
    AuthorizationExchangeFailed(String),

    /// The provider rejected the refresh token or could not be reached.
    #[error("access token refresh failed: {0}")]
    RefreshFailed(String),

    /// Tokens were issued but could not be stored. The provider may already
    /// have rotated the refresh token, in which case the new tokens are lost.
    #[error("failed to persist issued tokens: {0}")]
    PersistenceFailure(String),

    #[error("failed to read token record: {0}")]
    StoreReadFailed(String),
}

impl TokenError {
    pub fn not_connected(user_id: impl Into<String>) -> Self {
        TokenError::NotConnected {
            user_id: user_id.into(),
        }
    }
}
