//! User records held by the user directory.
//!
//! A `UserRecord` is the application's durable identity. Its `id` is fixed
//! when the record is created (see [`NewUser::derive_id`]) and its `links`
//! map provider names to the external IDs linked to the account.

use hearthgate_core::UserId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// The account is in use.
    #[default]
    Active,
    /// The account is dormant.
    Inactive,
    /// Any status the application defines beyond the two above.
    Other,
}

impl UserStatus {
    /// Returns the status as stored.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Other => "other",
        }
    }

    /// Parses a stored status; unrecognized values map to `Other`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "active" => Self::Active,
            "inactive" => Self::Inactive,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External identities linked to an account, keyed by provider name.
pub type Links = BTreeMap<String, String>;

/// A user record as stored in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Primary key, never changed after creation.
    id: UserId,
    /// Name used for display and for name-based matching.
    username: String,
    /// Account status.
    #[serde(default)]
    status: UserStatus,
    /// Linked external identities.
    #[serde(default)]
    links: Links,
}

impl UserRecord {
    /// Creates a record with all fields specified.
    ///
    /// Use this when reconstituting a record from storage.
    #[must_use]
    pub fn with_all_fields(id: UserId, username: String, status: UserStatus, links: Links) -> Self {
        Self {
            id,
            username,
            status,
            links,
        }
    }

    /// Returns the record's primary key.
    #[must_use]
    pub fn id(&self) -> &UserId {
        &self.id
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the account status.
    #[must_use]
    pub fn status(&self) -> UserStatus {
        self.status
    }

    /// Returns all linked external identities.
    #[must_use]
    pub fn links(&self) -> &Links {
        &self.links
    }

    /// Returns the external ID linked for `provider`, if any.
    #[must_use]
    pub fn link(&self, provider: &str) -> Option<&str> {
        self.links.get(provider).map(String::as_str)
    }

    /// Returns true if this record holds the given external identity.
    #[must_use]
    pub fn is_linked_to(&self, provider: &str, external_id: &str) -> bool {
        self.link(provider) == Some(external_id)
    }

    pub(crate) fn set_link(&mut self, provider: String, external_id: String) {
        self.links.insert(provider, external_id);
    }

    pub(crate) fn set_username(&mut self, username: String) {
        self.username = username;
    }

    pub(crate) fn set_status(&mut self, status: UserStatus) {
        self.status = status;
    }
}

/// Fields for a record that does not exist yet.
///
/// The directory owns the rule that turns these fields into a primary key:
/// an explicit `id` wins, then the `slug`, then the `username`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    id: Option<UserId>,
    slug: Option<String>,
    username: String,
    status: UserStatus,
    links: Links,
}

impl NewUser {
    /// Starts a new record with the given username and default status.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: None,
            slug: None,
            username: username.into(),
            status: UserStatus::default(),
            links: Links::new(),
        }
    }

    /// Sets an explicit primary key.
    #[must_use]
    pub fn with_id(mut self, id: UserId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the slug used to derive the primary key.
    #[must_use]
    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    /// Sets the account status.
    #[must_use]
    pub fn with_status(mut self, status: UserStatus) -> Self {
        self.status = status;
        self
    }

    /// Adds a linked external identity.
    #[must_use]
    pub fn with_link(mut self, provider: impl Into<String>, external_id: impl Into<String>) -> Self {
        self.links.insert(provider.into(), external_id.into());
        self
    }

    /// Returns the primary key this record will be stored under.
    #[must_use]
    pub fn derive_id(&self) -> UserId {
        match (&self.id, &self.slug) {
            (Some(id), _) => id.clone(),
            (None, Some(slug)) if !slug.is_empty() => UserId::new(slug.clone()),
            _ => UserId::new(self.username.clone()),
        }
    }

    /// Returns the links this record will be created with.
    #[must_use]
    pub fn links(&self) -> &Links {
        &self.links
    }

    /// Materializes the stored record.
    #[must_use]
    pub fn into_record(self) -> UserRecord {
        let id = self.derive_id();
        UserRecord {
            id,
            username: self.username,
            status: self.status,
            links: self.links,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_id_prefers_explicit_id() {
        let user = NewUser::new("alice")
            .with_slug("alice-slug")
            .with_id(UserId::new("explicit"));
        assert_eq!(user.derive_id(), UserId::new("explicit"));
    }

    #[test]
    fn derive_id_falls_back_to_slug_then_username() {
        assert_eq!(
            NewUser::new("alice").with_slug("al").derive_id(),
            UserId::new("al")
        );
        assert_eq!(NewUser::new("alice").derive_id(), UserId::new("alice"));
        assert_eq!(
            NewUser::new("alice").with_slug("").derive_id(),
            UserId::new("alice")
        );
    }

    #[test]
    fn into_record_carries_links_and_status() {
        let record = NewUser::new("alice")
            .with_link("slack", "U123")
            .with_status(UserStatus::Inactive)
            .into_record();

        assert_eq!(record.id(), &UserId::new("alice"));
        assert_eq!(record.username(), "alice");
        assert_eq!(record.status(), UserStatus::Inactive);
        assert!(record.is_linked_to("slack", "U123"));
        assert!(!record.is_linked_to("slack", "U999"));
        assert_eq!(record.link("github"), None);
    }

    #[test]
    fn status_parse_maps_unknown_to_other() {
        assert_eq!(UserStatus::parse("active"), UserStatus::Active);
        assert_eq!(UserStatus::parse("inactive"), UserStatus::Inactive);
        assert_eq!(UserStatus::parse("banned"), UserStatus::Other);
    }

    #[test]
    fn record_deserializes_with_defaults() {
        let json = r#"{ "id": "bob", "username": "bob" }"#;
        let record: UserRecord = serde_json::from_str(json).expect("deserialize");
        assert_eq!(record.status(), UserStatus::Active);
        assert!(record.links().is_empty());
    }
}
