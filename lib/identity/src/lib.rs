//! Identity reconciliation and session binding.
//!
//! A login goes through four steps:
//!
//! 1. [`verify`] checks the external profile against the configured
//!    organization restriction.
//! 2. [`Reconciler::reconcile`] maps the profile onto a user record, by
//!    linked identity, by name, or by creating one.
//! 3. [`SessionBinder::bind`] attaches the user to the session and persists
//!    it.
//! 4. On later requests, [`SessionBinder::deserialize`] turns the session's
//!    user reference back into the current record.
//!
//! [`SessionLifecycle`] covers the session itself: resume or start, assign
//! the pseudonymous hash, list and destroy.
//!
//! Storage is behind the [`UserDirectory`] and [`SessionStore`] traits. The
//! [`memory`] module provides in-process implementations.

pub mod auth;
pub mod binder;
pub mod config;
pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod profile;
pub mod reconcile;
pub mod session;
pub mod user;
pub mod verifier;

pub use auth::AuthenticatedUser;
pub use binder::SessionBinder;
pub use config::{AuthConfig, FieldsConfig, ProviderConfig};
pub use directory::{FILTERABLE_ATTRIBUTES, PatchOp, UserDirectory, UserFilter};
pub use error::{DirectoryError, LoginError, ProfileError, SessionStoreError};
pub use lifecycle::{SessionLifecycle, session_hash};
pub use profile::ExternalProfile;
pub use reconcile::{ReconcilePolicy, Reconciler, Resolution, ResolutionKind};
pub use session::{SessionRecord, SessionState, SessionStore, SessionView};
pub use user::{NewUser, UserRecord, UserStatus};
pub use verifier::{RejectReason, Verdict, verify};
