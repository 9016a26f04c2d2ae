//! hearthgate web server.
//!
//! Wires identity reconciliation and session binding to HTTP: the session
//! layer, the OAuth login flow, session management routes, and the Postgres
//! implementations of the user directory and session store.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod oauth;
