//! Authentication module for the hearthgate server.
//!
//! This module provides:
//! - The session layer that resumes or starts a session on every request,
//!   assigns its hash and resolves the bound user
//! - The login flow against the external identity provider
//! - Session management routes (`GET /sessions`, `DELETE /sessions/{session}`)
//! - Extractors for handlers that need the current session or user

pub mod middleware;
pub mod routes;

use hearthgate_identity::{
    AuthConfig, ReconcilePolicy, Reconciler, SessionBinder, SessionLifecycle, SessionStore,
    UserDirectory,
};
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::oauth::IdentityProvider;

pub use middleware::{CurrentSession, OptionalAuth, RequireAuth, session_layer};
pub use routes::{callback, destroy_session, list_sessions, start};

/// Shared application state.
pub struct AppState {
    /// Session resume, hashing, listing and destruction.
    pub lifecycle: SessionLifecycle,
    /// Maps external profiles to users.
    pub reconciler: Reconciler,
    /// Binds users to sessions.
    pub binder: SessionBinder,
    /// The configured identity provider.
    pub provider: Arc<dyn IdentityProvider>,
    /// Session configuration.
    pub session_config: SessionConfig,
}

impl AppState {
    /// Wires the login components over a directory and session store.
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn IdentityProvider>,
        auth: &AuthConfig,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            lifecycle: SessionLifecycle::new(store.clone(), session_config.ttl()),
            reconciler: Reconciler::new(directory.clone(), ReconcilePolicy::from(auth)),
            binder: SessionBinder::new(directory, store),
            provider,
            session_config,
        }
    }
}
