//! Identity reconciliation: maps a verified external profile onto a user
//! record by exact link, by name, or by creating one.
//!
//! Every write is safe to have happened even if the request is abandoned
//! afterwards: creation is unique by ID and linking is a single targeted
//! field operation. The only retry is the lookup that follows a lost
//! creation race.

use crate::config::AuthConfig;
use crate::directory::{PatchOp, UserDirectory, UserFilter};
use crate::error::{DirectoryError, LoginError};
use crate::profile::ExternalProfile;
use crate::user::{NewUser, UserRecord};
use crate::verifier::{Verdict, verify};
use hearthgate_core::UserId;
use rootcause::prelude::Report;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How a profile was resolved to a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    /// A record already held this external identity.
    Linked,
    /// An existing record matched by name and was linked.
    Adopted,
    /// A new record was created.
    Created,
}

/// A user record together with how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    user: UserRecord,
    kind: ResolutionKind,
}

impl Resolution {
    fn new(user: UserRecord, kind: ResolutionKind) -> Self {
        Self { user, kind }
    }

    /// Returns the resolved record.
    #[must_use]
    pub fn user(&self) -> &UserRecord {
        &self.user
    }

    /// Returns how the record was resolved.
    #[must_use]
    pub fn kind(&self) -> ResolutionKind {
        self.kind
    }

    /// Returns true if this login created the record.
    #[must_use]
    pub fn is_new_user(&self) -> bool {
        self.kind == ResolutionKind::Created
    }

    /// Consumes the resolution and returns the record.
    #[must_use]
    pub fn into_user(self) -> UserRecord {
        self.user
    }
}

/// Settings the reconciler applies to every profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Organization every profile must belong to, if any.
    pub required_organization: Option<String>,
    /// Attribute compared against the display name when matching by name.
    pub username_field: String,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            required_organization: None,
            username_field: "username".to_string(),
        }
    }
}

impl From<&AuthConfig> for ReconcilePolicy {
    fn from(config: &AuthConfig) -> Self {
        Self {
            required_organization: config.provider().organization_id().map(str::to_string),
            username_field: config.fields().username().to_string(),
        }
    }
}

/// Resolves external profiles to user records.
#[derive(Clone)]
pub struct Reconciler {
    directory: Arc<dyn UserDirectory>,
    policy: ReconcilePolicy,
}

impl Reconciler {
    /// Creates a reconciler over `directory`.
    #[must_use]
    pub fn new(directory: Arc<dyn UserDirectory>, policy: ReconcilePolicy) -> Self {
        Self { directory, policy }
    }

    /// Returns the policy in effect.
    #[must_use]
    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    /// Resolves `profile` from `provider` to a user record.
    ///
    /// The profile is verified first; a rejected profile never reaches the
    /// directory. Then, in order: exact link lookup, name lookup (linking the
    /// match), creation. A creation that loses a race to a concurrent login
    /// re-runs the lookups once instead of failing.
    ///
    /// # Errors
    ///
    /// Returns `LoginError::Verification` for rejected profiles and
    /// `LoginError::Directory` for directory failures.
    #[instrument(
        skip(self, profile),
        fields(directory = self.directory.name(), external_id = profile.external_id())
    )]
    pub async fn reconcile(
        &self,
        profile: &ExternalProfile,
        provider: &str,
    ) -> Result<Resolution, Report<LoginError>> {
        if let Verdict::Reject(reason) =
            verify(profile, self.policy.required_organization.as_deref())
        {
            warn!(%reason, "external identity rejected");
            return Err(LoginError::Verification { reason }.into());
        }

        if let Some(resolution) = self.lookup(profile, provider).await? {
            return Ok(resolution);
        }

        let new_user = NewUser::new(profile.display_name())
            .with_id(UserId::new(profile.display_name()))
            .with_link(provider, profile.external_id());

        match self.directory.create(new_user).await {
            Ok(user) => {
                info!(user_id = %user.id(), "created user for external identity");
                Ok(Resolution::new(user, ResolutionKind::Created))
            }
            Err(DirectoryError::DuplicateId { id }) => {
                debug!(user_id = %id, "lost creation race, resolving existing record");
                match self.lookup(profile, provider).await? {
                    Some(resolution) => Ok(resolution),
                    None => Err(LoginError::from(DirectoryError::Backend {
                        details: format!("user '{id}' reported as duplicate but not found"),
                    })
                    .into()),
                }
            }
            Err(source) => Err(LoginError::from(source).into()),
        }
    }

    /// Exact-link lookup, then name lookup with linking.
    async fn lookup(
        &self,
        profile: &ExternalProfile,
        provider: &str,
    ) -> Result<Option<Resolution>, Report<LoginError>> {
        let linked = self
            .directory
            .get(&UserFilter::linked_to(provider, profile.external_id()))
            .await
            .map_err(LoginError::from)?;
        if let Some(user) = linked {
            debug!(user_id = %user.id(), "returning user by linked identity");
            return Ok(Some(Resolution::new(user, ResolutionKind::Linked)));
        }

        let name = profile.display_name();
        let similar = self
            .directory
            .get(&UserFilter::any([
                UserFilter::Id(UserId::new(name)),
                UserFilter::attribute(self.policy.username_field.as_str(), name),
            ]))
            .await
            .map_err(LoginError::from)?;
        let Some(similar) = similar else {
            return Ok(None);
        };

        let patched = self
            .directory
            .patch(
                similar.id(),
                &[PatchOp::add_link(provider, profile.external_id())],
            )
            .await
            .map_err(LoginError::from)?;
        info!(user_id = %patched.id(), "linked external identity to existing user by name");
        Ok(Some(Resolution::new(patched, ResolutionKind::Adopted)))
    }
}
