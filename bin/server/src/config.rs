//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys (`SESSION__TTL_DAYS`, `AUTH__PROVIDER__CLIENT_ID`).
//! Values stay strings until deserialization, so numeric-looking client
//! IDs and secrets are kept verbatim.
//!
//! See [`AuthConfig`] for the identity provider and directory settings.

use hearthgate_identity::AuthConfig;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// PostgreSQL connection URL. In-memory stores are used when absent.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Identity provider and user directory configuration.
    pub auth: AuthConfig,
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in days.
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,

    /// Name of the session cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Interval between session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_ttl_days() -> i64 {
    30
}

fn default_cookie_name() -> String {
    "hearthgate.id".to_string()
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_ttl_days(),
            cookie_name: default_cookie_name(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

impl SessionConfig {
    /// Session lifetime as a duration.
    #[must_use]
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.ttl_days)
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::default().separator("__"))
    }

    fn from_source<S>(source: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn environment(vars: &[(&str, &str)]) -> config::Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        config::Environment::default()
            .separator("__")
            .source(Some(source))
    }

    #[test]
    fn session_config_has_correct_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.ttl_days, 30);
        assert_eq!(config.cookie_name, "hearthgate.id");
        assert_eq!(config.cleanup_interval_seconds, 300);
        assert!(config.secure_cookies);
        assert_eq!(config.ttl(), chrono::Duration::days(30));
    }

    #[test]
    fn loads_nested_keys_from_environment() {
        let config = ServerConfig::from_source(environment(&[
            ("AUTH__RESOURCE", "people"),
            ("AUTH__PROVIDER__CLIENT_ID", "client"),
            ("AUTH__PROVIDER__CLIENT_SECRET", "secret"),
            ("AUTH__PROVIDER__CALLBACK_URL", "https://app.example.com/cb"),
            ("AUTH__PROVIDER__ORGANIZATION_ID", "T123"),
            ("SESSION__SECURE_COOKIES", "false"),
        ]))
        .unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:3000");
        assert!(config.database_url.is_none());
        assert!(!config.session.secure_cookies);
        assert_eq!(config.auth.resource(), "people");
        assert_eq!(config.auth.provider().client_id(), "client");
        assert_eq!(config.auth.provider().organization_id(), Some("T123"));
        assert_eq!(config.auth.provider().name(), "slack");
        assert_eq!(config.auth.fields().username(), "username");
    }

    #[test]
    fn numeric_looking_credentials_are_kept_verbatim() {
        let config = ServerConfig::from_source(environment(&[
            ("AUTH__RESOURCE", "people"),
            ("AUTH__PROVIDER__CLIENT_ID", "1234567890123.9876543210987"),
            ("AUTH__PROVIDER__CLIENT_SECRET", "12345e6"),
            ("AUTH__PROVIDER__CALLBACK_URL", "https://app.example.com/cb"),
            ("AUTH__PROVIDER__ORGANIZATION_ID", "0042"),
            ("SESSION__TTL_DAYS", "7"),
            ("SESSION__CLEANUP_INTERVAL_SECONDS", "60"),
        ]))
        .unwrap();

        let provider = config.auth.provider();
        assert_eq!(provider.client_id(), "1234567890123.9876543210987");
        assert_eq!(provider.client_secret(), "12345e6");
        assert_eq!(provider.organization_id(), Some("0042"));
        assert_eq!(config.session.ttl_days, 7);
        assert_eq!(config.session.cleanup_interval_seconds, 60);
    }

    #[test]
    fn unqueryable_username_field_is_rejected_at_load() {
        let result = ServerConfig::from_source(environment(&[
            ("AUTH__RESOURCE", "people"),
            ("AUTH__PROVIDER__CLIENT_ID", "client"),
            ("AUTH__PROVIDER__CLIENT_SECRET", "secret"),
            ("AUTH__PROVIDER__CALLBACK_URL", "https://app.example.com/cb"),
            ("AUTH__FIELDS__USERNAME", "handle"),
        ]));

        let err = result.unwrap_err().to_string();
        assert!(err.contains("handle"), "{err}");
    }

    #[test]
    fn missing_provider_credentials_fail() {
        let result = ServerConfig::from_source(environment(&[("AUTH__RESOURCE", "people")]));
        assert!(result.is_err());
    }
}
