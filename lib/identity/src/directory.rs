//! The user directory the reconciler reads and writes.
//!
//! A directory supports three operations: get-by-filter, create and
//! patch-by-id. Implementations must reject a create whose derived ID is
//! already taken with [`DirectoryError::DuplicateId`], and must keep every
//! `(provider, external_id)` pair on at most one record.

use crate::error::DirectoryError;
use crate::user::{NewUser, UserRecord, UserStatus};
use async_trait::async_trait;
use hearthgate_core::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// User attributes every directory can filter on.
pub const FILTERABLE_ATTRIBUTES: &[&str] = &["id", "username", "status"];

/// A query over user records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserFilter {
    /// Matches the record with this primary key.
    Id(UserId),
    /// Matches records whose named attribute equals `value`.
    Attribute { name: String, value: String },
    /// Matches the record holding this external identity.
    LinkedTo {
        provider: String,
        external_id: String,
    },
    /// Matches records satisfying any of the inner filters.
    Any(Vec<UserFilter>),
}

impl UserFilter {
    /// Filter on a named attribute.
    #[must_use]
    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Attribute {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Filter on a linked external identity.
    #[must_use]
    pub fn linked_to(provider: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self::LinkedTo {
            provider: provider.into(),
            external_id: external_id.into(),
        }
    }

    /// Boolean-or of several filters.
    #[must_use]
    pub fn any(filters: impl IntoIterator<Item = UserFilter>) -> Self {
        Self::Any(filters.into_iter().collect())
    }

    /// Returns true if directories can filter on attribute `name`.
    #[must_use]
    pub fn is_filterable(name: &str) -> bool {
        FILTERABLE_ATTRIBUTES.contains(&name)
    }

    /// Evaluates the filter against a record.
    ///
    /// Attribute filters support the [`FILTERABLE_ATTRIBUTES`].
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::UnsupportedFilter` for other attribute names.
    pub fn matches(&self, user: &UserRecord) -> Result<bool, DirectoryError> {
        match self {
            Self::Id(id) => Ok(user.id() == id),
            Self::Attribute { name, value } => match name.as_str() {
                "id" => Ok(user.id().as_str() == value),
                "username" => Ok(user.username() == value),
                "status" => Ok(user.status().as_str() == value),
                _ => Err(DirectoryError::UnsupportedFilter {
                    field: name.clone(),
                }),
            },
            Self::LinkedTo {
                provider,
                external_id,
            } => Ok(user.is_linked_to(provider, external_id)),
            Self::Any(filters) => {
                for filter in filters {
                    if filter.matches(user)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// A field-level patch operation, in JSON Patch form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Adds or replaces the value at `path`.
    Add { path: String, value: Value },
}

impl PatchOp {
    /// Links an external identity: `add /links/<provider>`.
    #[must_use]
    pub fn add_link(provider: &str, external_id: &str) -> Self {
        Self::Add {
            path: format!("/links/{}", escape_pointer_token(provider)),
            value: Value::String(external_id.to_string()),
        }
    }

    /// Resolves the operation into a typed change.
    ///
    /// Supported targets are `/links/<provider>`, `/username` and `/status`.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::InvalidPatch` for unsupported paths, for
    /// the immutable `/id`, or for values of the wrong type.
    pub fn change(&self) -> Result<PatchChange, DirectoryError> {
        let Self::Add { path, value } = self;
        let invalid = |reason: &str| DirectoryError::InvalidPatch {
            path: path.clone(),
            reason: reason.to_string(),
        };
        let string_value = || value.as_str().map(str::to_string).ok_or_else(|| invalid("value must be a string"));

        let tokens: Vec<String> = path
            .strip_prefix('/')
            .ok_or_else(|| invalid("path must start with '/'"))?
            .split('/')
            .map(unescape_pointer_token)
            .collect();

        match tokens.as_slice() {
            [field] if field == "id" => Err(invalid("id is immutable")),
            [field] if field == "username" => Ok(PatchChange::Username(string_value()?)),
            [field] if field == "status" => Ok(PatchChange::Status(UserStatus::parse(&string_value()?))),
            [field, provider] if field == "links" && !provider.is_empty() => Ok(PatchChange::Link {
                provider: provider.clone(),
                external_id: string_value()?,
            }),
            _ => Err(invalid("unsupported path")),
        }
    }
}

/// A validated patch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchChange {
    Link {
        provider: String,
        external_id: String,
    },
    Username(String),
    Status(UserStatus),
}

impl PatchChange {
    /// Applies the change to an in-memory record.
    pub fn apply(self, user: &mut UserRecord) {
        match self {
            Self::Link {
                provider,
                external_id,
            } => user.set_link(provider, external_id),
            Self::Username(username) => user.set_username(username),
            Self::Status(status) => user.set_status(status),
        }
    }
}

fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn unescape_pointer_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Storage for user records.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns the directory's resource name.
    fn name(&self) -> &str;

    /// Returns the first record matching `filter`, if any.
    async fn get(&self, filter: &UserFilter) -> Result<Option<UserRecord>, DirectoryError>;

    /// Creates a record under [`NewUser::derive_id`].
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::DuplicateId` if the ID is taken.
    async fn create(&self, user: NewUser) -> Result<UserRecord, DirectoryError>;

    /// Applies field-level operations to the record with this ID and returns
    /// the updated record.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::NotFound` if no such record exists.
    async fn patch(&self, id: &UserId, ops: &[PatchOp]) -> Result<UserRecord, DirectoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::Links;
    use serde_json::json;

    fn alice() -> UserRecord {
        let mut links = Links::new();
        links.insert("slack".to_string(), "U1".to_string());
        UserRecord::with_all_fields(
            UserId::new("alice"),
            "Alice".to_string(),
            UserStatus::Active,
            links,
        )
    }

    #[test]
    fn filters_match_fields() {
        let user = alice();

        assert!(UserFilter::Id(UserId::new("alice")).matches(&user).unwrap());
        assert!(UserFilter::attribute("username", "Alice").matches(&user).unwrap());
        assert!(UserFilter::attribute("status", "active").matches(&user).unwrap());
        assert!(UserFilter::linked_to("slack", "U1").matches(&user).unwrap());
        assert!(!UserFilter::linked_to("slack", "U2").matches(&user).unwrap());
        assert!(!UserFilter::linked_to("github", "U1").matches(&user).unwrap());
    }

    #[test]
    fn any_filter_is_boolean_or() {
        let user = alice();
        let filter = UserFilter::any([
            UserFilter::Id(UserId::new("Alice")),
            UserFilter::attribute("username", "Alice"),
        ]);
        assert!(filter.matches(&user).unwrap());

        let miss = UserFilter::any([
            UserFilter::Id(UserId::new("bob")),
            UserFilter::attribute("username", "bob"),
        ]);
        assert!(!miss.matches(&user).unwrap());
    }

    #[test]
    fn every_filterable_attribute_evaluates() {
        let user = alice();
        for name in FILTERABLE_ATTRIBUTES {
            assert!(UserFilter::attribute(*name, "x").matches(&user).is_ok(), "{name}");
        }
        assert!(!UserFilter::is_filterable("email"));
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let err = UserFilter::attribute("email", "a@example.com")
            .matches(&alice())
            .unwrap_err();
        assert_eq!(
            err,
            DirectoryError::UnsupportedFilter {
                field: "email".to_string()
            }
        );
    }

    #[test]
    fn add_link_targets_links_path() {
        let op = PatchOp::add_link("slack", "U9");
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({ "op": "add", "path": "/links/slack", "value": "U9" })
        );
        assert_eq!(
            op.change().unwrap(),
            PatchChange::Link {
                provider: "slack".to_string(),
                external_id: "U9".to_string(),
            }
        );
    }

    #[test]
    fn provider_names_are_pointer_escaped() {
        let op = PatchOp::add_link("corp/sso~1", "X");
        let PatchOp::Add { path, .. } = &op;
        assert_eq!(path, "/links/corp~1sso~01");
        assert_eq!(
            op.change().unwrap(),
            PatchChange::Link {
                provider: "corp/sso~1".to_string(),
                external_id: "X".to_string(),
            }
        );
    }

    #[test]
    fn id_is_immutable() {
        let op = PatchOp::Add {
            path: "/id".to_string(),
            value: json!("mallory"),
        };
        assert!(matches!(op.change(), Err(DirectoryError::InvalidPatch { .. })));
    }

    #[test]
    fn non_string_values_are_rejected() {
        let op = PatchOp::Add {
            path: "/links/slack".to_string(),
            value: json!(12),
        };
        assert!(matches!(op.change(), Err(DirectoryError::InvalidPatch { .. })));
    }

    #[test]
    fn apply_changes_record() {
        let mut user = alice();
        PatchOp::add_link("github", "gh-7")
            .change()
            .unwrap()
            .apply(&mut user);
        PatchOp::Add {
            path: "/status".to_string(),
            value: json!("inactive"),
        }
        .change()
        .unwrap()
        .apply(&mut user);

        assert!(user.is_linked_to("github", "gh-7"));
        assert!(user.is_linked_to("slack", "U1"));
        assert_eq!(user.status(), UserStatus::Inactive);
    }
}
