//! The authenticated request context.

use crate::session::SessionRecord;
use crate::user::UserRecord;
use hearthgate_core::UserId;

/// A session together with the full record of the user bound to it.
///
/// Only the session's user reference is durable; the record is re-resolved
/// on every request so changes made in the directory are picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    session: SessionRecord,
    user: UserRecord,
}

impl AuthenticatedUser {
    /// Returns `None` unless `session` is bound to `user`.
    #[must_use]
    pub fn new(session: SessionRecord, user: UserRecord) -> Option<Self> {
        (session.user() == Some(user.id())).then_some(Self { session, user })
    }

    #[must_use]
    pub fn session(&self) -> &SessionRecord {
        &self.session
    }

    #[must_use]
    pub fn user(&self) -> &UserRecord {
        &self.user
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        self.user.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::NewUser;
    use chrono::Duration;
    use hearthgate_core::SessionId;

    #[test]
    fn requires_matching_binding() {
        let alice = NewUser::new("alice").into_record();
        let mut session = SessionRecord::new(SessionId::new("s1"), Duration::hours(1));
        assert!(AuthenticatedUser::new(session.clone(), alice.clone()).is_none());

        session.replace_user(Some(UserId::new("alice")));
        let auth = AuthenticatedUser::new(session, alice).unwrap();
        assert_eq!(auth.user_id(), &UserId::new("alice"));
        assert_eq!(auth.session().id(), &SessionId::new("s1"));
    }
}
