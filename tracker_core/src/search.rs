//! Normalised search results and the provider seam the `/api` routes call.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One hit from any provider, in the shape the browser and the `resources`
/// table both expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub source: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchRequest {
    pub q: String,
    pub page: usize,
    /// Provider-native cursor (YouTube only).
    pub page_token: Option<String>,
}

impl SearchRequest {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Short identifier used in logs and error bodies.
    fn name(&self) -> &'static str;

    /// Reason the provider cannot be called at all (e.g. a missing API key).
    fn missing_config(&self) -> Option<&'static str> {
        None
    }

    async fn search(&self, req: &SearchRequest) -> Result<SearchPage>;
}
