//! Server-side sessions.
//!
//! A session moves through `New → Anonymous → Bound`, and is destroyed by
//! handing the record to [`SessionLifecycle::destroy`]. The hash is assigned
//! once by the lifecycle step and the user reference only by the
//! [`SessionBinder`], so a `Bound` session always went through a successful
//! reconcile and bind.
//!
//! [`SessionLifecycle::destroy`]: crate::lifecycle::SessionLifecycle::destroy
//! [`SessionBinder`]: crate::binder::SessionBinder

use crate::error::SessionStoreError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hearthgate_core::{SessionId, UserId};
use serde::{Deserialize, Serialize};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Freshly created, no hash yet.
    New,
    /// Hash assigned, no user bound.
    Anonymous,
    /// A resolved user is bound to the session.
    Bound { user: UserId },
}

/// Server-side session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque session identifier.
    id: SessionId,
    /// One-way derived identifier, set once.
    hash: Option<String>,
    /// Reference to the bound user.
    user: Option<UserId>,
    /// When the session was created.
    created_at: DateTime<Utc>,
    /// When the store may discard the session.
    expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Creates a new, unsaved session valid for `ttl`.
    #[must_use]
    pub fn new(id: SessionId, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id,
            hash: None,
            user: None,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Creates a session with all fields specified.
    ///
    /// Use this when reconstituting a session from storage.
    #[must_use]
    pub fn from_parts(
        id: SessionId,
        hash: Option<String>,
        user: Option<UserId>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            hash,
            user,
            created_at,
            expires_at,
        }
    }

    /// Returns the session ID.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the session hash, if assigned.
    #[must_use]
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// Returns the bound user's ID, if any.
    #[must_use]
    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    /// Returns when the session was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the session expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns the session's lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        match (&self.hash, &self.user) {
            (_, Some(user)) => SessionState::Bound { user: user.clone() },
            (Some(_), None) => SessionState::Anonymous,
            (None, None) => SessionState::New,
        }
    }

    /// Returns the fields safe to show to the session's owner.
    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            hash: self.hash.clone(),
            state: self.state(),
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }

    pub(crate) fn assign_hash(&mut self, hash: String) {
        self.hash = Some(hash);
    }

    /// Replaces the user reference and returns the previous one.
    pub(crate) fn replace_user(&mut self, user: Option<UserId>) -> Option<UserId> {
        std::mem::replace(&mut self.user, user)
    }
}

/// Public projection of a session. The raw session ID is never included;
/// a bound user appears under `user` through the flattened state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub hash: Option<String>,
    #[serde(flatten)]
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Durable storage for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads a session. Expired sessions load as `None`.
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>, SessionStoreError>;

    /// Inserts or replaces a session.
    async fn save(&self, session: &SessionRecord) -> Result<(), SessionStoreError>;

    /// Replaces a session that is still stored and unexpired.
    ///
    /// Returns `SessionStoreError::Gone` if the session was destroyed or has
    /// expired; a destroyed session is never written back.
    async fn update(&self, session: &SessionRecord) -> Result<(), SessionStoreError>;

    /// Removes a session. Removing a missing session succeeds.
    async fn destroy(&self, id: &SessionId) -> Result<(), SessionStoreError>;

    /// Removes expired sessions and returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, SessionStoreError>;
}
