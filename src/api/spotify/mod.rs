//! Spotify connection endpoints.
//!
//! - GET /api/users/spotify → connection status
//! - GET /api/users/connect-spotify → authorization URL for the frontend to open
//! - GET /api/users/spotify-auth-callback → exchanges the code, redirects to the frontend
//! - GET /api/users/listening-to → most recently played track

mod state_manager;

pub use state_manager::{run_state_cleanup, StateManager};

use crate::auth::JwtVerifier;
use crate::spotify::{ListeningTo, SpotifyClient};
use crate::tokens::{ConnectionState, TokenError, TokenLifecycleManager};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for Spotify endpoints
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        let message = err.to_string();
        match err {
            TokenError::NotConnected { .. } => AppError::Conflict(message),
            TokenError::AuthorizationExchangeFailed(_) | TokenError::RefreshFailed(_) => {
                AppError::BadGateway(message)
            }
            TokenError::PersistenceFailure(_) | TokenError::StoreReadFailed(_) => {
                AppError::ServerError(message)
            }
        }
    }
}

/// Shared application state for the Spotify API
#[derive(Clone)]
pub struct SpotifyAppState {
    pub manager: Arc<TokenLifecycleManager>,
    pub spotify: Arc<SpotifyClient>,
    pub state_manager: StateManager,
    /// Verifies the session tokens issued by the account service
    pub verifier: JwtVerifier,
    /// Redirect URI registered with Spotify (points at the callback route)
    pub callback_url: String,
    /// Where the browser is sent once the account is connected
    pub frontend_url: String,
}

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Response for GET /api/users/spotify
#[derive(Serialize)]
pub struct SpotifyStatusResponse {
    pub connected: bool,
    pub state: ConnectionState,
}

/// Response for GET /api/users/connect-spotify
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectSpotifyResponse {
    pub redirect_to: String,
}

/// Response for GET /api/users/listening-to
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningToResponse {
    pub listening_to: Option<ListeningTo>,
}

/// Create Spotify API router
pub fn create_spotify_router(state: SpotifyAppState) -> Router {
    Router::new()
        .route("/api/users/spotify", get(spotify_status))
        .route("/api/users/connect-spotify", get(connect_spotify))
        .route("/api/users/spotify-auth-callback", get(spotify_auth_callback))
        .route("/api/users/listening-to", get(listening_to))
        .with_state(Arc::new(state))
}

fn authenticate(state: &SpotifyAppState, headers: &HeaderMap) -> Result<String, AppError> {
    state.verifier.authenticate(headers).map_err(|e| {
        debug!(error = %e, "Rejected bearer credential");
        AppError::Unauthorized(e.to_string())
    })
}

/// GET /api/users/spotify
async fn spotify_status(
    State(state): State<Arc<SpotifyAppState>>,
    headers: HeaderMap,
) -> Result<Json<SpotifyStatusResponse>, AppError> {
    let user_id = authenticate(&state, &headers)?;
    let connection = state.manager.connection_state(&user_id)?;

    Ok(Json(SpotifyStatusResponse {
        connected: connection.is_connected(),
        state: connection,
    }))
}

/// GET /api/users/connect-spotify
///
/// Returns the authorization URL instead of redirecting, so the frontend can
/// navigate there itself after an authenticated AJAX call.
async fn connect_spotify(
    State(state): State<Arc<SpotifyAppState>>,
    headers: HeaderMap,
) -> Result<Json<ConnectSpotifyResponse>, AppError> {
    let user_id = authenticate(&state, &headers)?;

    let csrf_state = state.state_manager.create_state(&user_id);
    let redirect_to = state
        .spotify
        .authorization_url(&csrf_state, &state.callback_url);

    info!(user_id = %user_id, "Issued Spotify authorization URL");

    Ok(Json(ConnectSpotifyResponse { redirect_to }))
}

/// GET /api/users/spotify-auth-callback
///
/// Exchanges the authorization code for tokens and sends the browser back to
/// the frontend.
///
/// # Security
/// - Validates the single-use CSRF state parameter
/// - The state, not a bearer credential, identifies the user
async fn spotify_auth_callback(
    State(state): State<Arc<SpotifyAppState>>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Redirect, AppError> {
    if let Some(error) = callback.error {
        warn!(error = %error, "User did not grant Spotify access");
        return Err(AppError::BadRequest(format!(
            "User didn't grant access to Spotify: {}",
            error
        )));
    }

    let code = callback
        .code
        .ok_or_else(|| AppError::BadRequest("Missing 'code' parameter".to_string()))?;
    let csrf_state = callback
        .state
        .ok_or_else(|| AppError::BadRequest("Missing 'state' parameter".to_string()))?;

    let entry = state
        .state_manager
        .validate_and_consume(&csrf_state)
        .ok_or_else(|| {
            warn!(state = %csrf_state, "Invalid or expired OAuth state");
            AppError::Unauthorized("Invalid or expired OAuth state".to_string())
        })?;

    debug!(user_id = %entry.user_id, "OAuth state validated");

    state
        .manager
        .complete_authorization(&entry.user_id, &code, &state.callback_url)
        .await?;

    Ok(Redirect::to(&state.frontend_url))
}

/// GET /api/users/listening-to
async fn listening_to(
    State(state): State<Arc<SpotifyAppState>>,
    headers: HeaderMap,
) -> Result<Json<ListeningToResponse>, AppError> {
    let user_id = authenticate(&state, &headers)?;
    let access_token = state.manager.get_valid_token(&user_id).await?;

    let listening_to = state
        .spotify
        .fetch_listening_to(&access_token)
        .await
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "Spotify recently-played lookup failed");
            AppError::BadGateway(format!("Spotify API request failed: {}", e))
        })?;

    Ok(Json(ListeningToResponse { listening_to }))
}
