//! Google sign-in (OAuth 2.0 authorization code flow with PKCE).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;
use tracker_core::{Error, ExternalProfile, GoogleOAuthConfig, IdentityProvider, Result};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const SCOPES: &str = "openid email profile";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl From<UserInfo> for ExternalProfile {
    fn from(u: UserInfo) -> Self {
        Self {
            google_id: u.sub,
            email: u.email.filter(|e| !e.trim().is_empty()),
            name: u.name.filter(|n| !n.trim().is_empty()),
        }
    }
}

#[derive(Clone)]
pub struct GoogleIdentityProvider {
    client: Client,
    cfg: GoogleOAuthConfig,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
}

impl GoogleIdentityProvider {
    pub fn new(client: Client, cfg: GoogleOAuthConfig) -> Self {
        Self {
            client,
            cfg,
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            userinfo_url: USERINFO_URL.to_string(),
        }
    }

    /// Point the token and userinfo calls somewhere else (local fakes).
    pub fn with_endpoints(
        mut self,
        token_url: impl Into<String>,
        userinfo_url: impl Into<String>,
    ) -> Self {
        self.token_url = token_url.into();
        self.userinfo_url = userinfo_url.into();
        self
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn authorize_url(&self, state: &str, code_challenge: &str) -> String {
        let params = [
            ("response_type", "code"),
            ("client_id", self.cfg.client_id.as_str()),
            ("redirect_uri", self.cfg.callback_url.as_str()),
            ("scope", SCOPES),
            ("state", state),
            ("code_challenge", code_challenge),
            ("code_challenge_method", "S256"),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.auth_url)
    }

    #[instrument(level = "info", skip_all)]
    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<ExternalProfile> {
        let token: TokenResponse = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.cfg.client_id.as_str()),
                ("client_secret", self.cfg.client_secret.as_str()),
                ("redirect_uri", self.cfg.callback_url.as_str()),
                ("code_verifier", code_verifier),
            ])
            .send()
            .await
            .map_err(Error::backend_reqwest)?
            .error_for_status()
            .map_err(|e| Error::Unauthorized(format!("google token exchange rejected: {e}")))?
            .json()
            .await
            .map_err(Error::backend_reqwest)?;

        let info: UserInfo = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(Error::backend_reqwest)?
            .error_for_status()
            .map_err(Error::backend_reqwest)?
            .json()
            .await
            .map_err(Error::backend_reqwest)?;

        tracing::debug!(has_email = info.email.is_some(), "google profile fetched");
        Ok(info.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GoogleIdentityProvider {
        GoogleIdentityProvider::new(
            Client::new(),
            GoogleOAuthConfig {
                client_id: "client-1.apps.googleusercontent.com".into(),
                client_secret: "shh".into(),
                callback_url: "http://localhost:3000/authentication/google/callback".into(),
            },
        )
    }

    #[test]
    fn authorize_url_carries_state_pkce_and_scopes() {
        let url = provider().authorize_url("st8", "chal");
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=client-1.apps.googleusercontent.com"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fauthentication%2Fgoogle%2Fcallback"
        ));
        assert!(url.contains("scope=openid%20email%20profile"));
        assert!(url.contains("state=st8"));
        assert!(url.contains("code_challenge=chal&code_challenge_method=S256"));
        assert!(!url.contains("shh"));
    }

    #[test]
    fn blank_profile_fields_become_none() {
        let info: UserInfo =
            serde_json::from_str(r#"{"sub": "1234", "email": "", "name": "Ada"}"#).unwrap();
        let profile = ExternalProfile::from(info);
        assert_eq!(profile.google_id, "1234");
        assert_eq!(profile.email, None);
        assert_eq!(profile.name.as_deref(), Some("Ada"));
    }
}
