//! Verified external profiles.

use crate::config::ProviderConfig;
use crate::error::ProfileError;
use serde_json::Value;

/// The identity asserted by the external provider after a successful
/// OAuth handshake. Request-scoped and immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalProfile {
    external_id: String,
    display_name: String,
    organization_id: Option<String>,
    raw: Value,
}

impl ExternalProfile {
    /// Creates a profile with no organization and an empty raw payload.
    #[must_use]
    pub fn new(external_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            display_name: display_name.into(),
            organization_id: None,
            raw: Value::Null,
        }
    }

    /// Sets the organization the identity belongs to.
    #[must_use]
    pub fn with_organization(mut self, organization_id: Option<String>) -> Self {
        self.organization_id = organization_id;
        self
    }

    /// Attaches the provider's payload.
    #[must_use]
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    /// Builds a profile from a provider payload using the configured claim
    /// names. Missing organization claims are allowed.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::MissingClaim` if the ID or name claim is absent.
    pub fn from_claims(raw: Value, provider: &ProviderConfig) -> Result<Self, ProfileError> {
        let external_id = scalar_claim(&raw, provider.id_claim()).ok_or_else(|| {
            ProfileError::MissingClaim {
                claim: provider.id_claim().to_string(),
            }
        })?;
        let display_name = scalar_claim(&raw, provider.name_claim()).ok_or_else(|| {
            ProfileError::MissingClaim {
                claim: provider.name_claim().to_string(),
            }
        })?;
        let organization_id = scalar_claim(&raw, provider.organization_claim());

        Ok(Self {
            external_id,
            display_name,
            organization_id,
            raw,
        })
    }

    /// Returns the provider-unique user ID.
    #[must_use]
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    /// Returns the display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the organization ID, if the provider reported one.
    #[must_use]
    pub fn organization_id(&self) -> Option<&str> {
        self.organization_id.as_deref()
    }

    /// Returns the provider's payload.
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

fn scalar_claim(raw: &Value, claim: &str) -> Option<String> {
    match raw.get(claim)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> ProviderConfig {
        ProviderConfig::new(
            "id".to_string(),
            "secret".to_string(),
            "https://app.example.com/cb".to_string(),
        )
    }

    #[test]
    fn profile_builder() {
        let profile = ExternalProfile::new("U123", "alice")
            .with_organization(Some("T1".to_string()))
            .with_raw(json!({ "sub": "U123" }));

        assert_eq!(profile.external_id(), "U123");
        assert_eq!(profile.display_name(), "alice");
        assert_eq!(profile.organization_id(), Some("T1"));
        assert_eq!(profile.raw()["sub"], "U123");
    }

    #[test]
    fn from_claims_reads_slack_userinfo() {
        let raw = json!({
            "ok": true,
            "sub": "U0R7JM",
            "name": "krane",
            "https://slack.com/team_id": "T0R7GR",
        });

        let profile = ExternalProfile::from_claims(raw.clone(), &provider()).expect("profile");

        assert_eq!(profile.external_id(), "U0R7JM");
        assert_eq!(profile.display_name(), "krane");
        assert_eq!(profile.organization_id(), Some("T0R7GR"));
        assert_eq!(profile.raw(), &raw);
    }

    #[test]
    fn from_claims_accepts_numeric_ids_and_missing_organization() {
        let raw = json!({ "sub": 42, "name": "bob" });
        let profile = ExternalProfile::from_claims(raw, &provider()).expect("profile");

        assert_eq!(profile.external_id(), "42");
        assert!(profile.organization_id().is_none());
    }

    #[test]
    fn from_claims_requires_name() {
        let raw = json!({ "sub": "U1", "name": "" });
        let err = ExternalProfile::from_claims(raw, &provider()).unwrap_err();
        assert_eq!(
            err,
            ProfileError::MissingClaim {
                claim: "name".to_string()
            }
        );
    }
}
