//! Session store backed by a Postgres `sessions` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearthgate_core::{SessionId, UserId};
use hearthgate_identity::{SessionRecord, SessionStore, SessionStoreError};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    id: String,
    hash: Option<String>,
    user_id: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl SessionRow {
    fn try_into_session(self) -> Result<SessionRecord, SessionStoreError> {
        let user = self
            .user_id
            .as_deref()
            .map(UserId::from_str)
            .transpose()
            .map_err(|e| SessionStoreError::Corrupt {
                session_id: SessionId::new(self.id.clone()),
                details: e.to_string(),
            })?;
        Ok(SessionRecord::from_parts(
            SessionId::new(self.id),
            self.hash,
            user,
            self.created_at,
            self.expires_at,
        ))
    }
}

fn backend(e: sqlx::Error) -> SessionStoreError {
    SessionStoreError::Backend {
        details: e.to_string(),
    }
}

/// Postgres implementation of [`SessionStore`].
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Creates a new session store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the sessions table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), SessionStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                hash TEXT,
                user_id TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS sessions_expires_at_idx ON sessions (expires_at)")
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>, SessionStoreError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, hash, user_id, created_at, expires_at
            FROM sessions
            WHERE id = $1 AND expires_at > NOW()
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(SessionRow::try_into_session).transpose()
    }

    async fn save(&self, session: &SessionRecord) -> Result<(), SessionStoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, hash, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET hash = EXCLUDED.hash, user_id = EXCLUDED.user_id, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(session.id().as_str())
        .bind(session.hash())
        .bind(session.user().map(UserId::as_str))
        .bind(session.created_at())
        .bind(session.expires_at())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn update(&self, session: &SessionRecord) -> Result<(), SessionStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET hash = $2, user_id = $3, expires_at = $4
            WHERE id = $1 AND expires_at > NOW()
            "#,
        )
        .bind(session.id().as_str())
        .bind(session.hash())
        .bind(session.user().map(UserId::as_str))
        .bind(session.expires_at())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(SessionStoreError::Gone);
        }
        Ok(())
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), SessionStoreError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, SessionStoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected())
    }
}
