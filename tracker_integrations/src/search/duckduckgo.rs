//! DuckDuckGo Instant Answer API.
//!
//! The API returns a single document (abstract + related topics), so paging is
//! simulated by slicing the flattened related topics.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;
use tracker_core::{Error, Result, SearchPage, SearchProvider, SearchRequest, SearchResult};

const DEFAULT_API_BASE: &str = "https://api.duckduckgo.com/";
pub const PAGE_SIZE: usize = 5;
const SOURCE: &str = "DuckDuckGo";

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct DuckResponse {
    #[serde(default, rename = "Abstract")]
    abstract_text: String,
    #[serde(default)]
    heading: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    related_topics: Vec<DuckTopic>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct DuckTopic {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "FirstURL")]
    first_url: Option<String>,
    #[serde(default)]
    topics: Vec<DuckTopic>,
}

impl DuckTopic {
    fn link(&self) -> Option<(&str, &str)> {
        match (self.text.as_deref(), self.first_url.as_deref()) {
            (Some(text), Some(url)) if !text.is_empty() && !url.is_empty() => Some((text, url)),
            _ => None,
        }
    }
}

/// Related topics as `(title, url)`, one level of nested groups expanded.
fn flatten_topics(topics: &[DuckTopic]) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for t in topics {
        if let Some((text, url)) = t.link() {
            out.push((text.to_string(), url.to_string()));
        } else {
            out.extend(
                t.topics
                    .iter()
                    .filter_map(DuckTopic::link)
                    .map(|(text, url)| (text.to_string(), url.to_string())),
            );
        }
    }
    out
}

fn map_response(resp: &DuckResponse, q: &str, page: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if page == 0 && !resp.abstract_text.is_empty() {
        let title = if resp.heading.is_empty() {
            q.to_string()
        } else {
            resp.heading.clone()
        };
        let url = if resp.abstract_url.is_empty() {
            format!("https://duckduckgo.com/?q={}", urlencoding::encode(q))
        } else {
            resp.abstract_url.clone()
        };
        results.push(SearchResult {
            source: SOURCE.to_string(),
            title,
            url,
            snippet: resp.abstract_text.clone(),
            extra: None,
        });
    }

    let related = flatten_topics(&resp.related_topics);
    results.extend(
        related
            .into_iter()
            .skip(page.saturating_mul(PAGE_SIZE))
            .take(PAGE_SIZE)
            .map(|(title, url)| SearchResult {
                source: SOURCE.to_string(),
                title,
                url,
                snippet: String::new(),
                extra: None,
            }),
    );
    results
}

#[derive(Clone)]
pub struct DuckDuckGoSearch {
    client: Client,
    api_base: String,
}

impl DuckDuckGoSearch {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    fn name(&self) -> &'static str {
        "duck"
    }

    #[instrument(level = "info", skip(self), fields(q = %req.q, page = req.page))]
    async fn search(&self, req: &SearchRequest) -> Result<SearchPage> {
        let resp = self
            .client
            .get(&self.api_base)
            .query(&[
                ("q", req.q.as_str()),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(Error::backend_reqwest)?
            .error_for_status()
            .map_err(Error::backend_reqwest)?;
        // Served as application/x-javascript, so decode the bytes directly.
        let bytes = resp.bytes().await.map_err(Error::backend_reqwest)?;
        let body: DuckResponse =
            serde_json::from_slice(&bytes).map_err(|e| Error::backend("decode duckduckgo", e))?;

        Ok(SearchPage {
            results: map_response(&body, &req.q, req.page),
            next_page_token: None,
        })
    }
}
