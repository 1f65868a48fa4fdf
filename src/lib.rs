// Configuration loading
pub mod config;

// Spotify token lifecycle (store, refresh, expiry)
pub mod tokens;

// Spotify accounts service and Web API client
pub mod spotify;

// Session token verification
pub mod auth;

// HTTP API
pub mod api;
