use anyhow::{Context, Result};
use spotlink::api::{cors_layer, create_spotify_router, run_state_cleanup, SpotifyAppState, StateManager};
use spotlink::auth::JwtVerifier;
use spotlink::config;
use spotlink::spotify::SpotifyClient;
use spotlink::tokens::{SqliteTokenStore, TokenLifecycleManager};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spotlink=info".into()),
        )
        .init();

    info!("spotlink starting...");

    let config_path =
        std::env::var("SPOTLINK_CONFIG").unwrap_or_else(|_| "spotlink.toml".to_string());
    let config = config::load_or_default(&config_path)?;
    config.validate().context("Invalid configuration")?;

    info!(
        config_path = %config_path,
        bind_addr = %config.server.bind_addr,
        database_path = %config.storage.database_path,
        "Configuration loaded"
    );

    let store = Arc::new(
        SqliteTokenStore::new(&config.storage.database_path)
            .context("Failed to initialize token store")?,
    );
    let spotify = Arc::new(SpotifyClient::new(config.spotify.clone()));
    let manager = Arc::new(TokenLifecycleManager::new(store, spotify.clone()));

    let state_manager = StateManager::new(config.server.state_expiry_seconds)
        .context("Failed to initialize OAuth state manager")?;
    tokio::spawn(run_state_cleanup(
        state_manager.clone(),
        config.server.state_cleanup_interval_seconds,
    ));

    let router = create_spotify_router(SpotifyAppState {
        manager,
        spotify,
        state_manager,
        verifier: JwtVerifier::new(&config.server.jwt_secret),
        callback_url: config.server.callback_url(),
        frontend_url: config.server.frontend_url.clone(),
    })
    .layer(cors_layer(&config.server.frontend_url)?);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(bind_addr = %config.server.bind_addr, "API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("API server error")?;

    info!("spotlink stopped");
    Ok(())
}
