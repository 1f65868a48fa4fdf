// HTTP API

pub mod spotify;

pub use spotify::{create_spotify_router, run_state_cleanup, SpotifyAppState, StateManager};

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use tower_http::cors::CorsLayer;

/// CORS policy letting the frontend call the API with its bearer credential.
pub fn cors_layer(frontend_url: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(frontend_url.trim_end_matches('/'))
        .with_context(|| format!("Invalid frontend origin '{}'", frontend_url))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}
