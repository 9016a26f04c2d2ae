//! Per-request session lifecycle: resume or start a session, give it a
//! stable pseudonymous hash, and the list/destroy management operations.

use crate::error::SessionStoreError;
use crate::session::{SessionRecord, SessionStore, SessionView};
use chrono::Duration;
use hearthgate_core::{Result, SessionId};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Derives the session hash: hex-encoded SHA-256 of the session ID.
#[must_use]
pub fn session_hash(id: &SessionId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

/// Session lifecycle operations over a session store.
#[derive(Clone)]
pub struct SessionLifecycle {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl SessionLifecycle {
    /// Creates the lifecycle with the TTL given to new sessions.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Returns the TTL given to new sessions.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Loads the session named by the client, or starts a new unsaved one
    /// if the client sent none or the store no longer has it.
    pub async fn resume(
        &self,
        id: Option<&SessionId>,
    ) -> Result<SessionRecord, SessionStoreError> {
        let stored = match id {
            Some(id) => self.store.load(id).await?,
            None => None,
        };
        Ok(stored.unwrap_or_else(|| self.start()))
    }

    /// Starts a new, unsaved session.
    #[must_use]
    pub fn start(&self) -> SessionRecord {
        SessionRecord::new(SessionId::generate(), self.ttl)
    }

    /// Assigns the session hash if the session has none, and persists the
    /// session before returning. Returns true if a hash was assigned.
    ///
    /// A hash, once set, is never recomputed.
    #[instrument(skip_all)]
    pub async fn ensure_hash(
        &self,
        session: &mut SessionRecord,
    ) -> Result<bool, SessionStoreError> {
        if session.hash().is_some() {
            return Ok(false);
        }
        session.assign_hash(session_hash(session.id()));
        self.store.save(session).await?;
        debug!(hash = session.hash(), "session hash assigned");
        Ok(true)
    }

    /// Lists the current session's public fields.
    #[must_use]
    pub fn describe(&self, session: &SessionRecord) -> Vec<SessionView> {
        vec![session.view()]
    }

    /// Destroys the session. Destroying a session the store no longer has
    /// succeeds.
    #[instrument(skip_all, fields(hash = session.hash()))]
    pub async fn destroy(&self, session: SessionRecord) -> Result<(), SessionStoreError> {
        self.store.destroy(session.id()).await?;
        debug!("session destroyed");
        Ok(())
    }

    /// Removes expired sessions from the store.
    pub async fn purge_expired(&self) -> Result<u64, SessionStoreError> {
        Ok(self.store.purge_expired().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySessionStore;
    use crate::session::SessionState;

    fn lifecycle() -> (Arc<InMemorySessionStore>, SessionLifecycle) {
        let store = Arc::new(InMemorySessionStore::new());
        let lifecycle = SessionLifecycle::new(store.clone(), Duration::days(30));
        (store, lifecycle)
    }

    #[test]
    fn hash_is_sha256_hex_of_id() {
        let hash = session_hash(&SessionId::new("abc"));
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash, session_hash(&SessionId::new("abc")));
    }

    #[tokio::test]
    async fn ensure_hash_assigns_once_and_persists() {
        let (store, lifecycle) = lifecycle();
        let mut session = lifecycle.start();
        assert_eq!(session.state(), SessionState::New);

        assert!(lifecycle.ensure_hash(&mut session).await.unwrap());
        let first = session.hash().map(str::to_string);
        assert_eq!(first.as_deref(), Some(session_hash(session.id()).as_str()));
        assert_eq!(session.state(), SessionState::Anonymous);

        let stored = store.load(session.id()).await.unwrap().unwrap();
        assert_eq!(stored.hash(), first.as_deref());

        assert!(!lifecycle.ensure_hash(&mut session).await.unwrap());
        assert_eq!(session.hash().map(str::to_string), first);
    }

    #[tokio::test]
    async fn ensure_hash_keeps_stored_hash() {
        let (store, lifecycle) = lifecycle();
        let existing = SessionRecord::from_parts(
            SessionId::new("s1"),
            Some("precomputed".to_string()),
            None,
            chrono::Utc::now(),
            chrono::Utc::now() + Duration::hours(1),
        );
        store.save(&existing).await.unwrap();

        let mut session = lifecycle.resume(Some(existing.id())).await.unwrap();
        assert!(!lifecycle.ensure_hash(&mut session).await.unwrap());
        assert_eq!(session.hash(), Some("precomputed"));
    }

    #[tokio::test]
    async fn resume_starts_new_session_for_unknown_id() {
        let (store, lifecycle) = lifecycle();
        let session = lifecycle
            .resume(Some(&SessionId::new("forged")))
            .await
            .unwrap();

        assert_ne!(session.id(), &SessionId::new("forged"));
        assert_eq!(session.state(), SessionState::New);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let (store, lifecycle) = lifecycle();
        let mut session = lifecycle.start();
        lifecycle.ensure_hash(&mut session).await.unwrap();

        lifecycle.destroy(session.clone()).await.unwrap();
        assert!(store.load(session.id()).await.unwrap().is_none());

        lifecycle.destroy(session).await.unwrap();
    }

    #[tokio::test]
    async fn describe_lists_current_session() {
        let (_store, lifecycle) = lifecycle();
        let mut session = lifecycle.start();
        lifecycle.ensure_hash(&mut session).await.unwrap();

        let views = lifecycle.describe(&session);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].hash.as_deref(), session.hash());
        assert_eq!(views[0].state, SessionState::Anonymous);
    }
}
