//! Postgres-backed user directory and session store.

pub mod sessions;
pub mod users;

pub use sessions::PgSessionStore;
pub use users::PgUserDirectory;

/// Returns true if `name` is safe to splice into SQL as a table name.
pub(crate) fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 48
}
