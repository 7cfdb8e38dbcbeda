pub mod duckduckgo;
pub mod wikipedia;
pub mod youtube;

use reqwest::Client;
use std::time::Duration;
use tracker_core::{Error, Result};

pub(crate) const USER_AGENT: &str = "KnowledgeTracker/0.1 (+http://localhost:3000/)";

/// Shared client settings for every provider.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(Error::backend_reqwest)
}
