//! Authentication and session management routes.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use hearthgate_identity::SessionView;
use serde::Deserialize;
use std::sync::Arc;
use time::Duration as TimeDuration;
use tracing::info;

use super::{
    AppState,
    middleware::{CurrentSession, SessionEnded, removal_cookie},
};
use crate::error::AuthError;
use crate::oauth::AuthState;

/// Auth state cookie name (for CSRF protection during the OAuth flow).
const AUTH_STATE_COOKIE: &str = "hearthgate.auth_state";

/// Query parameters for the OAuth callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

fn ensure_provider(state: &AppState, provider: &str) -> Result<(), AuthError> {
    if state.provider.name() != provider {
        return Err(AuthError::UnknownProvider {
            provider: provider.to_string(),
        });
    }
    Ok(())
}

/// Initiates the login flow by redirecting to the identity provider.
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    ensure_provider(&state, &provider)?;

    let (auth_url, auth_state) = state.provider.authorization_url();

    // Store the auth state in a secure cookie for validation on callback
    let auth_state_json =
        serde_json::to_string(&auth_state).map_err(|_| AuthError::InvalidAuthState)?;
    let cookie = Cookie::build((AUTH_STATE_COOKIE, auth_state_json))
        .path("/")
        .http_only(true)
        .secure(state.session_config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(10));

    Ok((jar.add(cookie), Redirect::to(&auth_url)))
}

/// Handles the callback after the user authenticates with the provider:
/// resolves the external identity to a user and binds it to the session.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    CurrentSession(mut session): CurrentSession,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    ensure_provider(&state, &provider)?;

    if let Some(error) = query.error {
        return Err(AuthError::ProviderDenied { error });
    }

    // Retrieve and validate auth state from cookie
    let auth_state_cookie = jar
        .get(AUTH_STATE_COOKIE)
        .ok_or(AuthError::MissingAuthState)?;
    let auth_state: AuthState =
        serde_json::from_str(auth_state_cookie.value()).map_err(|_| AuthError::InvalidAuthState)?;

    if query.state.as_deref() != Some(auth_state.csrf_token.as_str()) {
        return Err(AuthError::CsrfMismatch);
    }
    let code = query.code.ok_or(AuthError::InvalidAuthState)?;

    let profile = state.provider.authenticate(&code, &auth_state).await?;
    let resolution = state.reconciler.reconcile(&profile, &provider).await?;
    state.binder.bind(&mut session, resolution.user()).await?;

    info!(
        user_id = %resolution.user().id(),
        kind = ?resolution.kind(),
        "user signed in"
    );

    // Remove auth state cookie
    let remove_auth_state = Cookie::build((AUTH_STATE_COOKIE, ""))
        .path("/")
        .max_age(TimeDuration::ZERO);

    Ok((jar.add(remove_auth_state), Redirect::to("/")))
}

/// Lists the current session's public view.
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    CurrentSession(session): CurrentSession,
) -> Json<Vec<SessionView>> {
    Json(state.lifecycle.describe(&session))
}

/// Destroys the current session. The path segment is not consulted: a
/// client can only end its own session.
pub async fn destroy_session(
    State(state): State<Arc<AppState>>,
    Path(_session): Path<String>,
    CurrentSession(session): CurrentSession,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response, AuthError> {
    state.lifecycle.destroy(session).await?;

    let jar = jar.add(removal_cookie(&state));
    let mut response = if wants_json(&headers) {
        (jar, StatusCode::NO_CONTENT).into_response()
    } else {
        (jar, Redirect::to("/")).into_response()
    };
    response.extensions_mut().insert(SessionEnded);
    Ok(response)
}

/// True if the client prefers JSON over HTML.
///
/// The highest-quality media range decides, earlier ranges winning ties.
/// Wildcards and a missing Accept header choose JSON.
fn wants_json(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return true;
    };

    let mut best: Option<(f32, bool)> = None;
    for range in accept.split(',') {
        let mut params = range.split(';');
        let media = params.next().unwrap_or_default().trim().to_ascii_lowercase();
        let quality = params
            .filter_map(|p| p.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        let json = match media.as_str() {
            "application/json" | "application/*" | "*/*" => true,
            "text/html" | "application/xhtml+xml" | "text/*" => false,
            _ => continue,
        };
        if quality > 0.0 && best.is_none_or(|(q, _)| quality > q) {
            best = Some((quality, json));
        }
    }
    best.is_none_or(|(_, json)| json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn accept(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn json_clients_are_detected() {
        assert!(wants_json(&accept("application/json")));
        assert!(!wants_json(&accept("text/html,application/xhtml+xml")));
        assert!(!wants_json(&accept("text/html, application/json")));
        assert!(!wants_json(&accept(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
        )));
        assert!(!wants_json(&accept("application/json;q=0.5, text/html")));
        assert!(wants_json(&accept("text/html;q=0.5, application/json")));
    }

    #[test]
    fn wildcard_and_missing_accept_choose_json() {
        assert!(wants_json(&HeaderMap::new()));
        assert!(wants_json(&accept("*/*")));
        assert!(wants_json(&accept("text/html;q=0, */*")));
    }
}
