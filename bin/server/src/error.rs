//! HTTP-facing errors for the authentication surface.
//!
//! Internal details are logged here and never sent to the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hearthgate_identity::{LoginError, SessionStoreError};
use rootcause::prelude::Report;
use std::fmt;

use crate::oauth::OAuthError;

/// Errors returned by authentication routes and the session layer.
#[derive(Debug)]
pub enum AuthError {
    /// The route names a provider this server is not configured for.
    UnknownProvider { provider: String },
    /// The OAuth state cookie is missing.
    MissingAuthState,
    /// The OAuth state cookie could not be read or written.
    InvalidAuthState,
    /// The callback's state parameter does not match the cookie.
    CsrfMismatch,
    /// The provider reported an error instead of an authorization code.
    ProviderDenied { error: String },
    /// The handshake with the provider failed.
    OAuth(Report<OAuthError>),
    /// Reconciliation or binding failed.
    Login(Report<LoginError>),
    /// The session store failed.
    Session(Report<SessionStoreError>),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProvider { provider } => write!(f, "unknown provider '{provider}'"),
            Self::MissingAuthState => write!(f, "missing auth state"),
            Self::InvalidAuthState => write!(f, "invalid auth state"),
            Self::CsrfMismatch => write!(f, "CSRF token mismatch"),
            Self::ProviderDenied { error } => write!(f, "provider returned error '{error}'"),
            Self::OAuth(report) => write!(f, "OAuth handshake failed: {}", report.current_context()),
            Self::Login(report) => write!(f, "{}", report.current_context()),
            Self::Session(report) => write!(f, "session store failed: {}", report.current_context()),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<Report<OAuthError>> for AuthError {
    fn from(report: Report<OAuthError>) -> Self {
        Self::OAuth(report)
    }
}

impl From<Report<LoginError>> for AuthError {
    fn from(report: Report<LoginError>) -> Self {
        Self::Login(report)
    }
}

impl From<Report<SessionStoreError>> for AuthError {
    fn from(report: Report<SessionStoreError>) -> Self {
        Self::Session(report)
    }
}

impl AuthError {
    /// Status code and user-safe message.
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Self::UnknownProvider { .. } => (StatusCode::NOT_FOUND, "Unknown provider"),
            Self::MissingAuthState => (StatusCode::BAD_REQUEST, "Missing auth state"),
            Self::InvalidAuthState => (StatusCode::BAD_REQUEST, "Invalid auth state"),
            Self::CsrfMismatch => (StatusCode::BAD_REQUEST, "CSRF token mismatch"),
            Self::ProviderDenied { .. } => (StatusCode::FORBIDDEN, "Access denied"),
            Self::OAuth(_) => (StatusCode::BAD_GATEWAY, "Authentication failed"),
            Self::Login(report) => match report.current_context() {
                LoginError::Verification { .. } => (StatusCode::FORBIDDEN, "Access denied"),
                LoginError::Persist { .. } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Signed in, but the session could not be saved. Please try again.",
                ),
                LoginError::Directory { .. } | LoginError::UnknownUser { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                }
            },
            Self::Session(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = self.status();
        match &self {
            Self::OAuth(report) => tracing::error!(error = %report.current_context(), "OAuth handshake failed"),
            Self::Login(report) if status.is_server_error() => {
                tracing::error!(error = %report.current_context(), "login failed");
            }
            Self::Session(report) => tracing::error!(error = %report.current_context(), "session store failed"),
            other => tracing::info!(error = %other, "authentication request rejected"),
        }
        (status, message).into_response()
    }
}
