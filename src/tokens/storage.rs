//! SQLite-backed token store.
//!
//! One row per user. Tokens are stored as issued (no encryption at rest), so
//! the database file must be protected by filesystem permissions.

use super::{TokenRecord, TokenStore};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Token storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE spotify_tokens (
///     user_id TEXT PRIMARY KEY,
///     access_token TEXT,
///     refresh_token TEXT,
///     access_token_expires_after TEXT,  -- RFC 3339 timestamp
///     updated_at TEXT NOT NULL,         -- RFC 3339 timestamp
///     CHECK (access_token IS NULL OR access_token_expires_after IS NOT NULL)
/// );
/// ```
///
/// Writes are single upsert statements, so each one replaces the record
/// atomically. An incoming record without a refresh token keeps the stored one.
pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
}

impl SqliteTokenStore {
    /// Creates or opens a token store. Pass `":memory:"` for a throwaway store.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS spotify_tokens (
                user_id TEXT PRIMARY KEY,
                access_token TEXT,
                refresh_token TEXT,
                access_token_expires_after TEXT,
                updated_at TEXT NOT NULL,
                CHECK (access_token IS NULL OR access_token_expires_after IS NOT NULL)
            )
            "#,
            [],
        )
        .context("Failed to create spotify_tokens table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Token store connection lock poisoned"))
    }
}

impl TokenStore for SqliteTokenStore {
    fn read(&self, user_id: &str) -> Result<TokenRecord> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT access_token, refresh_token, access_token_expires_after
                FROM spotify_tokens
                WHERE user_id = ?1
                "#,
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()
            .context("Failed to read token record")?;

        let Some((access_token, refresh_token, expires_after)) = row else {
            return Ok(TokenRecord::default());
        };

        let access_token_expires_after = expires_after
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
            .transpose()
            .context("Failed to parse access_token_expires_after timestamp")?;

        Ok(TokenRecord {
            access_token,
            refresh_token,
            access_token_expires_after,
        })
    }

    fn write(&self, user_id: &str, record: &TokenRecord) -> Result<()> {
        if record.access_token.is_some() && record.access_token_expires_after.is_none() {
            bail!("Refusing to store an access token without an expiry");
        }

        let expires_after = record.access_token_expires_after.map(|dt| dt.to_rfc3339());
        let now = Utc::now().to_rfc3339();

        self.conn()?
            .execute(
                r#"
                INSERT INTO spotify_tokens (
                    user_id, access_token, refresh_token,
                    access_token_expires_after, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(user_id) DO UPDATE SET
                    access_token = excluded.access_token,
                    refresh_token = COALESCE(excluded.refresh_token, spotify_tokens.refresh_token),
                    access_token_expires_after = excluded.access_token_expires_after,
                    updated_at = excluded.updated_at
                "#,
                params![
                    user_id,
                    record.access_token,
                    record.refresh_token,
                    expires_after,
                    now,
                ],
            )
            .context("Failed to write token record")?;

        Ok(())
    }
}
