//! Session layer and authentication extractors for Axum.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use hearthgate_core::SessionId;
use hearthgate_identity::{AuthenticatedUser, LoginError, SessionRecord};
use std::sync::Arc;
use time::Duration as TimeDuration;
use tracing::warn;

use super::AppState;
use crate::error::AuthError;

/// The session for the current request, as it stood when the handler ran.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub SessionRecord);

/// Response marker: the handler destroyed the session, so the session layer
/// must not re-issue its cookie.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionEnded;

/// Resumes or starts the session, assigns its hash, resolves the bound user
/// and stores both in request extensions.
///
/// A session whose user no longer resolves is cleared and the request
/// continues anonymously.
pub async fn session_layer(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let cookie_name = state.session_config.cookie_name.as_str();
    let presented = jar
        .get(cookie_name)
        .and_then(|c| c.value().parse::<SessionId>().ok());

    let mut session = state.lifecycle.resume(presented.as_ref()).await?;
    state.lifecycle.ensure_hash(&mut session).await?;

    let mut authenticated = None;
    if let Some(user_id) = session.user().cloned() {
        match state.binder.deserialize(&user_id).await {
            Ok(user) => authenticated = AuthenticatedUser::new(session.clone(), user),
            Err(report) if matches!(report.current_context(), LoginError::UnknownUser { .. }) => {
                warn!(%user_id, "session references unknown user, clearing");
                state.binder.unbind(&mut session).await?;
            }
            Err(report) => return Err(report.into()),
        }
    }

    let issue_cookie = presented.as_ref() != Some(session.id());
    let session_id = session.id().clone();

    request.extensions_mut().insert(CurrentSession(session));
    if let Some(user) = authenticated {
        request.extensions_mut().insert(user);
    }

    let response = next.run(request).await;

    if issue_cookie && response.extensions().get::<SessionEnded>().is_none() {
        let jar = CookieJar::new().add(session_cookie(&state, &session_id));
        return Ok((jar, response).into_response());
    }
    Ok(response)
}

/// Builds the session cookie.
pub(crate) fn session_cookie(state: &AppState, id: &SessionId) -> Cookie<'static> {
    Cookie::build((
        state.session_config.cookie_name.clone(),
        id.as_str().to_string(),
    ))
    .path("/")
    .http_only(true)
    .secure(state.session_config.secure_cookies)
    .same_site(SameSite::Lax)
    .max_age(TimeDuration::days(state.session_config.ttl_days))
    .build()
}

/// Builds a cookie that removes the session cookie.
pub(crate) fn removal_cookie(state: &AppState) -> Cookie<'static> {
    Cookie::build((state.session_config.cookie_name.clone(), ""))
        .path("/")
        .max_age(TimeDuration::ZERO)
        .build()
}

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or(AuthRejection::MissingSessionLayer)
    }
}

/// Extractor for requiring an authenticated user.
///
/// If the user is not authenticated, they are redirected to the login route.
pub struct RequireAuth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(RequireAuth)
            .ok_or(AuthRejection::NotAuthenticated)
    }
}

/// Extractor for optionally getting the authenticated user.
///
/// Returns None if the user is not authenticated.
pub struct OptionalAuth(pub Option<AuthenticatedUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(parts.extensions.get::<AuthenticatedUser>().cloned()))
    }
}

/// Rejection type for authentication extractors.
#[derive(Debug)]
pub enum AuthRejection {
    NotAuthenticated,
    MissingSessionLayer,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::NotAuthenticated => Redirect::to("/").into_response(),
            Self::MissingSessionLayer => {
                tracing::error!("session layer is not installed on this route");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
