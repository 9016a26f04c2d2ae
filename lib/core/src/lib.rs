//! Core types and utilities for hearthgate.
//!
//! This crate provides the identifiers and the error-handling foundation
//! shared by the identity library and the server.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, SessionId, UserId};
