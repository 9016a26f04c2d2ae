//! Router assembly.

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};

/// Builds the application router with the session layer applied to every
/// route.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/authentications/{provider}", get(auth::start))
        .route("/authentications/{provider}/callback", get(auth::callback))
        .route("/sessions", get(auth::list_sessions))
        .route("/sessions/{session}", delete(auth::destroy_session))
        .layer(from_fn_with_state(state.clone(), auth::session_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
