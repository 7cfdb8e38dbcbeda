use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The fields of a third-party account the login flow relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProfile {
    pub google_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Authorization-code + PKCE login against an external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the browser is redirected to. `code_challenge` is the S256 challenge.
    fn authorize_url(&self, state: &str, code_challenge: &str) -> String;

    /// Exchange the callback `code` and fetch the signed-in user's profile.
    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<ExternalProfile>;
}
