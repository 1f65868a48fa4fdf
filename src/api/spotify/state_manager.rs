//! OAuth state management for CSRF protection.
//!
//! A state token ties the Spotify callback back to the user who started the
//! connect flow. The callback itself arrives from the browser without the
//! user's bearer credential, so the state is the only link.

use crate::tokens::{Clock, SystemClock};
use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// OAuth state entry (tracks state parameter for CSRF protection)
#[derive(Clone, Debug)]
pub struct StateEntry {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// OAuth state manager with automatic expiration
#[derive(Clone)]
pub struct StateManager {
    states: Arc<Mutex<HashMap<String, StateEntry>>>,
    expiry_duration: Duration,
    clock: Arc<dyn Clock>,
}

impl StateManager {
    /// Create a new state manager
    ///
    /// # Arguments
    /// * `expiry_seconds` - How long states remain valid (default: 600 = 10 minutes)
    ///
    /// Fails when `expiry_seconds` is not positive or too large for a duration.
    pub fn new(expiry_seconds: i64) -> Result<Self> {
        Self::with_clock(expiry_seconds, Arc::new(SystemClock))
    }

    pub fn with_clock(expiry_seconds: i64, clock: Arc<dyn Clock>) -> Result<Self> {
        ensure!(expiry_seconds > 0, "OAuth state expiry must be positive");
        let expiry_duration = Duration::try_seconds(expiry_seconds)
            .with_context(|| format!("OAuth state expiry {}s is out of range", expiry_seconds))?;

        Ok(Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            expiry_duration,
            clock,
        })
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, StateEntry>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Generate a new state token for `user_id` and store it
    ///
    /// Returns the state token (UUID v4)
    pub fn create_state(&self, user_id: &str) -> String {
        let state = Uuid::new_v4().to_string();
        let entry = StateEntry {
            user_id: user_id.to_string(),
            created_at: self.clock.now(),
        };

        self.states().insert(state.clone(), entry);

        state
    }

    /// Validate and consume a state token
    ///
    /// Returns the StateEntry if valid and not expired, None otherwise.
    /// The state is removed from the map (single-use).
    pub fn validate_and_consume(&self, state: &str) -> Option<StateEntry> {
        let entry = self.states().remove(state)?;

        if self.clock.now() - entry.created_at > self.expiry_duration {
            return None;
        }

        Some(entry)
    }

    /// Clean up expired states (should be called periodically)
    pub fn cleanup_expired(&self) {
        let now = self.clock.now();
        let expiry = self.expiry_duration;

        self.states()
            .retain(|_, entry| now - entry.created_at <= expiry);
    }

    /// Get count of active states (for debugging/monitoring)
    pub fn count(&self) -> usize {
        self.states().len()
    }
}

/// Background task to periodically clean up expired states
pub async fn run_state_cleanup(manager: StateManager, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        manager.cleanup_expired();
        tracing::debug!("OAuth state cleanup complete, {} states remaining", manager.count());
    }
}
