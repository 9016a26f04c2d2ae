//! Binds resolved users to sessions and maps them to and from the session's
//! user reference.

use crate::directory::{UserDirectory, UserFilter};
use crate::error::LoginError;
use crate::session::{SessionRecord, SessionStore};
use crate::user::UserRecord;
use hearthgate_core::UserId;
use rootcause::prelude::Report;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Attaches users to sessions.
#[derive(Clone)]
pub struct SessionBinder {
    directory: Arc<dyn UserDirectory>,
    store: Arc<dyn SessionStore>,
}

impl SessionBinder {
    #[must_use]
    pub fn new(directory: Arc<dyn UserDirectory>, store: Arc<dyn SessionStore>) -> Self {
        Self { directory, store }
    }

    /// Binds `user` to `session` and persists the session.
    ///
    /// Only a session that is still stored is written: one destroyed in the
    /// meantime stays destroyed. If the write fails the session keeps its
    /// previous user reference and the error is reported as
    /// `LoginError::Persist`. Directory changes made while resolving the
    /// user are not undone.
    #[instrument(skip_all, fields(user_id = %user.id(), hash = session.hash()))]
    pub async fn bind(
        &self,
        session: &mut SessionRecord,
        user: &UserRecord,
    ) -> Result<(), Report<LoginError>> {
        let previous = session.replace_user(Some(Self::serialize(user)));
        if let Err(source) = self.store.update(session).await {
            session.replace_user(previous);
            warn!(%source, "failed to persist session binding");
            return Err(LoginError::Persist {
                session_id: session.id().clone(),
                source,
            }
            .into());
        }
        debug!("user bound to session");
        Ok(())
    }

    /// Clears the session's user reference and persists the session.
    ///
    /// Used when the bound user no longer resolves; the session continues
    /// anonymously under the same hash.
    #[instrument(skip_all, fields(hash = session.hash()))]
    pub async fn unbind(&self, session: &mut SessionRecord) -> Result<(), Report<LoginError>> {
        let previous = session.replace_user(None);
        if let Err(source) = self.store.update(session).await {
            session.replace_user(previous);
            return Err(LoginError::Persist {
                session_id: session.id().clone(),
                source,
            }
            .into());
        }
        debug!("user reference cleared");
        Ok(())
    }

    /// The reference stored in the session for `user`.
    #[must_use]
    pub fn serialize(user: &UserRecord) -> UserId {
        user.id().clone()
    }

    /// Resolves a session's user reference back to the current record.
    ///
    /// # Errors
    ///
    /// Returns `LoginError::UnknownUser` if no record has this ID, and
    /// `LoginError::Directory` if the lookup fails.
    pub async fn deserialize(&self, user_id: &UserId) -> Result<UserRecord, Report<LoginError>> {
        self.directory
            .get(&UserFilter::Id(user_id.clone()))
            .await
            .map_err(LoginError::from)?
            .ok_or_else(|| {
                LoginError::UnknownUser {
                    user_id: user_id.clone(),
                }
                .into()
            })
    }
}
