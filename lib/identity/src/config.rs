//! Login configuration.
//!
//! `AuthConfig` names the user directory, describes the external identity
//! provider and says which user attribute carries the display name. The
//! defaults for the provider endpoints and claim names match Slack's
//! OpenID Connect endpoints.

use crate::directory::UserFilter;
use crate::error::DirectoryError;
use serde::{Deserialize, Deserializer, Serialize};

/// Top-level login configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Name of the user directory (resource) extended with external logins.
    resource: String,
    /// External identity provider settings.
    provider: ProviderConfig,
    /// Field names on the user resource.
    #[serde(default)]
    fields: FieldsConfig,
}

impl AuthConfig {
    /// Creates a configuration with default field names.
    #[must_use]
    pub fn new(resource: impl Into<String>, provider: ProviderConfig) -> Self {
        Self {
            resource: resource.into(),
            provider,
            fields: FieldsConfig::default(),
        }
    }

    /// Replaces the field-name configuration.
    #[must_use]
    pub fn with_fields(mut self, fields: FieldsConfig) -> Self {
        self.fields = fields;
        self
    }

    /// Returns the user directory name.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Returns the provider settings.
    #[must_use]
    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Returns the field-name configuration.
    #[must_use]
    pub fn fields(&self) -> &FieldsConfig {
        &self.fields
    }
}

/// Names of attributes on the user resource.
///
/// The username attribute must be one the user directories can filter on;
/// anything else is rejected when the configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldsConfig {
    /// Attribute used as the display/identity name when matching users.
    /// Default: "username"
    #[serde(
        default = "default_username_field",
        deserialize_with = "deserialize_username_field"
    )]
    username: String,
}

impl FieldsConfig {
    /// Creates a field configuration matching names on `username`.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::UnsupportedFilter` if directories cannot
    /// filter on that attribute.
    pub fn new(username: impl Into<String>) -> Result<Self, DirectoryError> {
        let username = username.into();
        if !UserFilter::is_filterable(&username) {
            return Err(DirectoryError::UnsupportedFilter { field: username });
        }
        Ok(Self { username })
    }

    /// Returns the attribute matched against display names.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            username: default_username_field(),
        }
    }
}

fn default_username_field() -> String {
    "username".to_string()
}

fn deserialize_username_field<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let field = String::deserialize(deserializer)?;
    FieldsConfig::new(field)
        .map(|fields| fields.username)
        .map_err(serde::de::Error::custom)
}

/// Configuration for the external OAuth identity provider.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name, used as the key in a user's `links`.
    /// Default: "slack"
    #[serde(default = "default_provider_name")]
    name: String,
    /// The OAuth2 client ID registered with the provider.
    client_id: String,
    /// The OAuth2 client secret.
    client_secret: String,
    /// The redirect URI for the OAuth2 callback.
    callback_url: String,
    /// Restrict logins to this organization (team) ID.
    #[serde(default)]
    organization_id: Option<String>,
    /// Authorization endpoint.
    #[serde(default = "default_authorize_url")]
    authorize_url: String,
    /// Token endpoint.
    #[serde(default = "default_token_url")]
    token_url: String,
    /// Endpoint returning the authenticated user's profile.
    #[serde(default = "default_userinfo_url")]
    userinfo_url: String,
    /// OAuth2 scopes to request as a comma-separated string.
    /// Default: "openid,profile"
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Profile claim holding the provider-unique user ID.
    #[serde(default = "default_id_claim")]
    id_claim: String,
    /// Profile claim holding the display name.
    #[serde(default = "default_name_claim")]
    name_claim: String,
    /// Profile claim holding the organization ID.
    #[serde(default = "default_organization_claim")]
    organization_claim: String,
}

fn default_provider_name() -> String {
    "slack".to_string()
}

fn default_authorize_url() -> String {
    "https://slack.com/openid/connect/authorize".to_string()
}

fn default_token_url() -> String {
    "https://slack.com/api/openid.connect.token".to_string()
}

fn default_userinfo_url() -> String {
    "https://slack.com/api/openid.connect.userInfo".to_string()
}

fn default_scopes() -> String {
    "openid,profile".to_string()
}

fn default_id_claim() -> String {
    "sub".to_string()
}

fn default_name_claim() -> String {
    "name".to_string()
}

fn default_organization_claim() -> String {
    "https://slack.com/team_id".to_string()
}

impl ProviderConfig {
    /// Creates a provider configuration with defaults for optional fields.
    #[must_use]
    pub fn new(client_id: String, client_secret: String, callback_url: String) -> Self {
        ProviderConfigBuilder::new(client_id, client_secret, callback_url).build()
    }

    /// Creates a configuration builder for more customization.
    #[must_use]
    pub fn builder(
        client_id: String,
        client_secret: String,
        callback_url: String,
    ) -> ProviderConfigBuilder {
        ProviderConfigBuilder::new(client_id, client_secret, callback_url)
    }

    /// Returns the provider name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the OAuth2 client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Returns the OAuth2 callback URL.
    #[must_use]
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Returns the organization logins are restricted to, if any.
    #[must_use]
    pub fn organization_id(&self) -> Option<&str> {
        self.organization_id.as_deref()
    }

    /// Returns the authorization endpoint.
    #[must_use]
    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    /// Returns the token endpoint.
    #[must_use]
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Returns the profile endpoint.
    #[must_use]
    pub fn userinfo_url(&self) -> &str {
        &self.userinfo_url
    }

    /// Returns the OAuth2 scopes to request, parsed from comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Returns the claim holding the provider-unique user ID.
    #[must_use]
    pub fn id_claim(&self) -> &str {
        &self.id_claim
    }

    /// Returns the claim holding the display name.
    #[must_use]
    pub fn name_claim(&self) -> &str {
        &self.name_claim
    }

    /// Returns the claim holding the organization ID.
    #[must_use]
    pub fn organization_claim(&self) -> &str {
        &self.organization_claim
    }
}

/// Builder for `ProviderConfig`.
#[derive(Debug)]
pub struct ProviderConfigBuilder {
    config: ProviderConfig,
}

impl ProviderConfigBuilder {
    /// Creates a new builder with required fields.
    #[must_use]
    pub fn new(client_id: String, client_secret: String, callback_url: String) -> Self {
        Self {
            config: ProviderConfig {
                name: default_provider_name(),
                client_id,
                client_secret,
                callback_url,
                organization_id: None,
                authorize_url: default_authorize_url(),
                token_url: default_token_url(),
                userinfo_url: default_userinfo_url(),
                scopes: default_scopes(),
                id_claim: default_id_claim(),
                name_claim: default_name_claim(),
                organization_claim: default_organization_claim(),
            },
        }
    }

    /// Sets the provider name.
    #[must_use]
    pub fn name(mut self, name: String) -> Self {
        self.config.name = name;
        self
    }

    /// Restricts logins to one organization.
    #[must_use]
    pub fn organization_id(mut self, organization_id: Option<String>) -> Self {
        self.config.organization_id = organization_id;
        self
    }

    /// Sets the authorization, token and profile endpoints.
    #[must_use]
    pub fn endpoints(mut self, authorize_url: String, token_url: String, userinfo_url: String) -> Self {
        self.config.authorize_url = authorize_url;
        self.config.token_url = token_url;
        self.config.userinfo_url = userinfo_url;
        self
    }

    /// Sets the OAuth2 scopes to request.
    #[must_use]
    pub fn scopes(mut self, scopes: Vec<String>) -> Self {
        self.config.scopes = scopes.join(",");
        self
    }

    /// Sets the claim names used to build a profile.
    #[must_use]
    pub fn claims(mut self, id_claim: String, name_claim: String, organization_claim: String) -> Self {
        self.config.id_claim = id_claim;
        self.config.name_claim = name_claim;
        self.config.organization_claim = organization_claim;
        self
    }

    /// Builds the `ProviderConfig`.
    #[must_use]
    pub fn build(self) -> ProviderConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderConfig {
        ProviderConfig::new(
            "client-id".to_string(),
            "client-secret".to_string(),
            "https://app.example.com/authentications/slack/callback".to_string(),
        )
    }

    #[test]
    fn new_provider_has_slack_defaults() {
        let config = provider();

        assert_eq!(config.name(), "slack");
        assert_eq!(config.client_id(), "client-id");
        assert_eq!(config.client_secret(), "client-secret");
        assert!(config.organization_id().is_none());
        assert_eq!(config.scopes(), vec!["openid", "profile"]);
        assert_eq!(config.id_claim(), "sub");
        assert_eq!(config.name_claim(), "name");
        assert_eq!(config.organization_claim(), "https://slack.com/team_id");
        assert!(config.token_url().starts_with("https://slack.com/"));
    }

    #[test]
    fn builder_allows_customization() {
        let config = ProviderConfig::builder(
            "id".to_string(),
            "secret".to_string(),
            "https://app.example.com/cb".to_string(),
        )
        .name("acme".to_string())
        .organization_id(Some("T123".to_string()))
        .scopes(vec!["openid".to_string(), "email".to_string()])
        .claims(
            "user_id".to_string(),
            "login".to_string(),
            "org".to_string(),
        )
        .build();

        assert_eq!(config.name(), "acme");
        assert_eq!(config.organization_id(), Some("T123"));
        assert_eq!(config.scopes(), vec!["openid", "email"]);
        assert_eq!(config.id_claim(), "user_id");
        assert_eq!(config.name_claim(), "login");
        assert_eq!(config.organization_claim(), "org");
    }

    #[test]
    fn auth_config_deserializes_with_defaults() {
        let json = r#"{
            "resource": "people",
            "provider": {
                "client_id": "my-client",
                "client_secret": "secret",
                "callback_url": "https://app.example.com/callback",
                "organization_id": "T42"
            }
        }"#;

        let config: AuthConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.resource(), "people");
        assert_eq!(config.fields().username(), "username");
        assert_eq!(config.provider().name(), "slack");
        assert_eq!(config.provider().organization_id(), Some("T42"));
    }

    fn with_username_field(field: &str) -> String {
        format!(
            r#"{{
                "resource": "people",
                "provider": {{
                    "client_id": "c",
                    "client_secret": "s",
                    "callback_url": "https://app.example.com/callback"
                }},
                "fields": {{ "username": "{field}" }}
            }}"#
        )
    }

    #[test]
    fn username_field_accepts_filterable_attribute() {
        let config: AuthConfig =
            serde_json::from_str(&with_username_field("id")).expect("deserialize");
        assert_eq!(config.fields().username(), "id");
    }

    #[test]
    fn username_field_rejects_unfilterable_attribute() {
        let err = serde_json::from_str::<AuthConfig>(&with_username_field("handle")).unwrap_err();
        assert!(err.to_string().contains("cannot filter users by field 'handle'"), "{err}");

        assert_eq!(
            FieldsConfig::new("handle"),
            Err(DirectoryError::UnsupportedFilter {
                field: "handle".to_string()
            })
        );
    }
}
