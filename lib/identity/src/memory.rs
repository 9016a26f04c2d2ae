//! In-memory implementations of the directory and session store.
//!
//! Locks are only held for the synchronous body of each operation, never
//! across an await point.

use crate::directory::{PatchOp, UserDirectory, UserFilter};
use crate::error::{DirectoryError, SessionStoreError};
use crate::session::{SessionRecord, SessionStore};
use crate::user::{NewUser, UserRecord};
use async_trait::async_trait;
use hearthgate_core::{SessionId, UserId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A user directory kept in process memory, ordered by user ID.
#[derive(Debug)]
pub struct InMemoryUserDirectory {
    name: String,
    users: Mutex<BTreeMap<UserId, UserRecord>>,
}

impl InMemoryUserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            users: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns every stored record.
    #[must_use]
    pub fn records(&self) -> Vec<UserRecord> {
        lock(&self.users).values().cloned().collect()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.users).len()
    }

    /// Returns true if the directory holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn ensure_link_free(
    users: &BTreeMap<UserId, UserRecord>,
    owner: &UserId,
    provider: &str,
    external_id: &str,
) -> Result<(), DirectoryError> {
    let taken = users
        .values()
        .any(|u| u.id() != owner && u.is_linked_to(provider, external_id));
    if taken {
        return Err(DirectoryError::DuplicateLink {
            provider: provider.to_string(),
            external_id: external_id.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, filter: &UserFilter) -> Result<Option<UserRecord>, DirectoryError> {
        let users = lock(&self.users);
        for user in users.values() {
            if filter.matches(user)? {
                return Ok(Some(user.clone()));
            }
        }
        Ok(None)
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord, DirectoryError> {
        let record = user.into_record();
        let mut users = lock(&self.users);

        if users.contains_key(record.id()) {
            return Err(DirectoryError::DuplicateId {
                id: record.id().clone(),
            });
        }
        for (provider, external_id) in record.links() {
            ensure_link_free(&users, record.id(), provider, external_id)?;
        }

        debug!(directory = %self.name, user_id = %record.id(), "user created");
        users.insert(record.id().clone(), record.clone());
        Ok(record)
    }

    async fn patch(&self, id: &UserId, ops: &[PatchOp]) -> Result<UserRecord, DirectoryError> {
        let changes = ops
            .iter()
            .map(PatchOp::change)
            .collect::<Result<Vec<_>, _>>()?;

        let mut users = lock(&self.users);
        let mut updated = users
            .get(id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound { id: id.clone() })?;
        for change in changes {
            change.apply(&mut updated);
        }
        for (provider, external_id) in updated.links() {
            ensure_link_free(&users, id, provider, external_id)?;
        }

        debug!(directory = %self.name, user_id = %id, ops = ops.len(), "user patched");
        users.insert(id.clone(), updated.clone());
        Ok(updated)
    }
}

/// A session store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionId, SessionRecord>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sessions, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Returns true if the store holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>, SessionStoreError> {
        Ok(lock(&self.sessions)
            .get(id)
            .filter(|s| !s.is_expired())
            .cloned())
    }

    async fn save(&self, session: &SessionRecord) -> Result<(), SessionStoreError> {
        lock(&self.sessions).insert(session.id().clone(), session.clone());
        Ok(())
    }

    async fn update(&self, session: &SessionRecord) -> Result<(), SessionStoreError> {
        let mut sessions = lock(&self.sessions);
        match sessions.get_mut(session.id()) {
            Some(stored) if !stored.is_expired() => {
                *stored = session.clone();
                Ok(())
            }
            _ => Err(SessionStoreError::Gone),
        }
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), SessionStoreError> {
        lock(&self.sessions).remove(id);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, SessionStoreError> {
        let mut sessions = lock(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        Ok((before - sessions.len()) as u64)
    }
}
