//! OAuth 2.0 handshake with the external identity provider.
//!
//! The flow is the authorization-code grant with PKCE:
//! - `/authentications/{provider}` redirects to the provider's authorization
//!   endpoint, with the CSRF token and PKCE verifier kept in a short-lived
//!   cookie
//! - `/authentications/{provider}/callback` exchanges the code for an access
//!   token, then fetches the user's profile from the userinfo endpoint
//!
//! The profile payload is mapped to an [`ExternalProfile`] through the claim
//! names in [`ProviderConfig`].

use async_trait::async_trait;
use hearthgate_identity::{ExternalProfile, ProfileError, ProviderConfig};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl, basic::BasicClient,
};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

/// State kept by the client between the redirect and the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub csrf_token: String,
    pub pkce_verifier: String,
}

/// An external identity provider able to authenticate a user.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider name, as used in routes and in users' `links`.
    fn name(&self) -> &str;

    /// Returns the URL to send the user to and the state to keep for the
    /// callback.
    fn authorization_url(&self) -> (String, AuthState);

    /// Completes the handshake and returns the asserted profile.
    async fn authenticate(
        &self,
        code: &str,
        state: &AuthState,
    ) -> Result<ExternalProfile, Report<OAuthError>>;
}

/// OAuth handshake errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    /// Configuration is invalid.
    Configuration { details: String },
    /// Token exchange failed.
    TokenExchange { details: String },
    /// The userinfo request failed.
    Userinfo { details: String },
    /// The provider answered the userinfo request with an error payload.
    Rejected { error: String },
    /// The profile payload lacks a required claim.
    Profile(ProfileError),
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { details } => write!(f, "configuration error: {details}"),
            Self::TokenExchange { details } => write!(f, "token exchange failed: {details}"),
            Self::Userinfo { details } => write!(f, "userinfo request failed: {details}"),
            Self::Rejected { error } => write!(f, "provider rejected userinfo request: {error}"),
            Self::Profile(e) => write!(f, "invalid profile: {e}"),
        }
    }
}

impl std::error::Error for OAuthError {}

/// OAuth client for a configured provider.
#[derive(Clone)]
pub struct OAuthClient {
    config: ProviderConfig,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    redirect_url: RedirectUrl,
    http: reqwest::Client,
}

impl OAuthClient {
    /// Creates a client from provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self, Report<OAuthError>> {
        let invalid = |what: &str, e: &dyn fmt::Display| OAuthError::Configuration {
            details: format!("invalid {what}: {e}"),
        };
        let auth_url = AuthUrl::new(config.authorize_url().to_string())
            .map_err(|e| invalid("authorization URL", &e))?;
        let token_url = TokenUrl::new(config.token_url().to_string())
            .map_err(|e| invalid("token URL", &e))?;
        let redirect_url = RedirectUrl::new(config.callback_url().to_string())
            .map_err(|e| invalid("callback URL", &e))?;

        // Following redirects during the token exchange would leak the code.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| invalid("HTTP client", &e))?;

        Ok(Self {
            config,
            auth_url,
            token_url,
            redirect_url,
            http,
        })
    }

    /// Returns the provider configuration.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn exchange_code(&self, code: &str, pkce_verifier: &str) -> Result<String, OAuthError> {
        let client = BasicClient::new(ClientId::new(self.config.client_id().to_string()))
            .set_client_secret(ClientSecret::new(self.config.client_secret().to_string()))
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| OAuthError::TokenExchange {
                details: e.to_string(),
            })?;

        Ok(token.access_token().secret().clone())
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<serde_json::Value, OAuthError> {
        let userinfo_error = |e: reqwest::Error| OAuthError::Userinfo {
            details: e.to_string(),
        };
        let payload: serde_json::Value = self
            .http
            .get(self.config.userinfo_url())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(userinfo_error)?
            .error_for_status()
            .map_err(userinfo_error)?
            .json()
            .await
            .map_err(userinfo_error)?;

        check_ok(&payload)?;
        Ok(payload)
    }
}

/// Slack-style APIs answer 200 with `{"ok": false, "error": ...}`.
fn check_ok(payload: &serde_json::Value) -> Result<(), OAuthError> {
    if payload.get("ok").and_then(serde_json::Value::as_bool) == Some(false) {
        let error = payload
            .get("error")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown_error");
        return Err(OAuthError::Rejected {
            error: error.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl IdentityProvider for OAuthClient {
    fn name(&self) -> &str {
        self.config.name()
    }

    fn authorization_url(&self) -> (String, AuthState) {
        let client = BasicClient::new(ClientId::new(self.config.client_id().to_string()))
            .set_auth_uri(self.auth_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge);
        for scope in self.config.scopes() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        if let Some(team) = self.config.organization_id() {
            // Preselects the workspace on Slack's consent screen.
            request = request.add_extra_param("team", team);
        }

        let (url, csrf_token) = request.url();
        let state = AuthState {
            csrf_token: csrf_token.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        };
        (url.to_string(), state)
    }

    #[instrument(skip_all, fields(provider = self.config.name()))]
    async fn authenticate(
        &self,
        code: &str,
        state: &AuthState,
    ) -> Result<ExternalProfile, Report<OAuthError>> {
        let access_token = self.exchange_code(code, &state.pkce_verifier).await?;
        let payload = self.fetch_userinfo(&access_token).await?;
        let profile = ExternalProfile::from_claims(payload, &self.config).map_err(OAuthError::Profile)?;
        debug!(external_id = profile.external_id(), "profile fetched");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(organization: Option<&str>) -> OAuthClient {
        let config = ProviderConfig::builder(
            "client-id".to_string(),
            "client-secret".to_string(),
            "https://app.example.com/authentications/slack/callback".to_string(),
        )
        .organization_id(organization.map(str::to_string))
        .build();
        OAuthClient::new(config).unwrap()
    }

    #[test]
    fn authorization_url_carries_pkce_and_state() {
        let client = client(Some("T123"));
        let (url, state) = client.authorization_url();

        assert!(url.starts_with("https://slack.com/openid/connect/authorize?"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("scope=openid+profile"));
        assert!(url.contains("team=T123"));
        assert!(url.contains(&format!("state={}", state.csrf_token)));
        assert!(!state.pkce_verifier.is_empty());
    }

    #[test]
    fn each_authorization_gets_fresh_state() {
        let client = client(None);
        let (_, first) = client.authorization_url();
        let (_, second) = client.authorization_url();
        assert_ne!(first.csrf_token, second.csrf_token);
    }

    #[test]
    fn invalid_callback_url_is_rejected() {
        let config = ProviderConfig::new(
            "id".to_string(),
            "secret".to_string(),
            "not a url".to_string(),
        );
        let err = OAuthClient::new(config).err().unwrap();
        assert!(matches!(
            err.current_context(),
            OAuthError::Configuration { .. }
        ));
    }

    #[test]
    fn slack_error_payloads_are_rejected() {
        assert_eq!(
            check_ok(&json!({ "ok": false, "error": "invalid_auth" })),
            Err(OAuthError::Rejected {
                error: "invalid_auth".to_string()
            })
        );
        assert!(check_ok(&json!({ "ok": true, "sub": "U1" })).is_ok());
        assert!(check_ok(&json!({ "sub": "U1" })).is_ok());
    }
}
