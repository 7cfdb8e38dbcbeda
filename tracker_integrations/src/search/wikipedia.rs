//! Wikipedia REST page summary.
//!
//! One result per request; `page` walks the summary extract three sentences
//! at a time.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;
use tracker_core::{Error, Result, SearchPage, SearchProvider, SearchRequest, SearchResult};

const DEFAULT_API_BASE: &str = "https://en.wikipedia.org/api/rest_v1";
pub const SENTENCES_PER_PAGE: usize = 3;
const EXHAUSTED: &str = "No more content";

#[derive(Debug, Deserialize, Default)]
struct WikiSummary {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    content_urls: Option<WikiContentUrls>,
}

#[derive(Debug, Deserialize, Default)]
struct WikiContentUrls {
    #[serde(default)]
    desktop: Option<WikiPageUrl>,
}

#[derive(Debug, Deserialize, Default)]
struct WikiPageUrl {
    #[serde(default)]
    page: Option<String>,
}

/// Split after `.`, `!` or `?` when followed by whitespace. The whitespace run
/// is dropped; everything else is kept verbatim.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    let mut iter = text.char_indices().peekable();

    while let Some((i, ch)) = iter.next() {
        if ch.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            out.push(&text[start..i]);
            let mut next = i + ch.len_utf8();
            while let Some(&(j, c)) = iter.peek() {
                if !c.is_whitespace() {
                    break;
                }
                next = j + c.len_utf8();
                iter.next();
            }
            start = next;
            prev = None;
            continue;
        }
        prev = Some(ch);
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Sentences `[page*3, page*3+3)` joined by a space.
pub fn sentence_page(text: &str, page: usize) -> String {
    let joined = split_sentences(text)
        .into_iter()
        .skip(page.saturating_mul(SENTENCES_PER_PAGE))
        .take(SENTENCES_PER_PAGE)
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        EXHAUSTED.to_string()
    } else {
        joined
    }
}

fn map_response(summary: WikiSummary, q: &str, page: usize) -> SearchResult {
    let url = summary
        .content_urls
        .and_then(|c| c.desktop)
        .and_then(|d| d.page)
        .unwrap_or_else(|| format!("https://en.wikipedia.org/wiki/{}", urlencoding::encode(q)));
    SearchResult {
        source: "wikipedia".to_string(),
        title: summary.title.unwrap_or_else(|| q.to_string()),
        url,
        snippet: sentence_page(summary.extract.as_deref().unwrap_or_default(), page),
        extra: None,
    }
}

#[derive(Clone)]
pub struct WikipediaSearch {
    client: Client,
    api_base: String,
}

impl WikipediaSearch {
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
impl SearchProvider for WikipediaSearch {
    fn name(&self) -> &'static str {
        "wiki"
    }

    #[instrument(level = "info", skip(self), fields(q = %req.q, page = req.page))]
    async fn search(&self, req: &SearchRequest) -> Result<SearchPage> {
        let url = format!(
            "{}/page/summary/{}",
            self.api_base,
            urlencoding::encode(&req.q)
        );
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Error::backend_reqwest)?
            .error_for_status()
            .map_err(Error::backend_reqwest)?;
        let summary: WikiSummary = resp.json().await.map_err(Error::backend_reqwest)?;

        Ok(SearchPage {
            results: vec![map_response(summary, &req.q, req.page)],
            next_page_token: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTRACT: &str = "Rust is fast. It is safe!  Is it fun? Yes. Cargo builds it.\nThe end";

    #[test]
    fn splits_on_terminal_punctuation() {
        assert_eq!(
            split_sentences(EXTRACT),
            vec![
                "Rust is fast.",
                "It is safe!",
                "Is it fun?",
                "Yes.",
                "Cargo builds it.",
                "The end"
            ]
        );
        assert_eq!(split_sentences("v1.2 is out"), vec!["v1.2 is out"]);
        assert!(split_sentences("").is_empty());
    }

    #[test]
    fn pages_three_sentences_at_a_time() {
        assert_eq!(sentence_page(EXTRACT, 0), "Rust is fast. It is safe! Is it fun?");
        assert_eq!(sentence_page(EXTRACT, 1), "Yes. Cargo builds it. The end");
        assert_eq!(sentence_page(EXTRACT, 2), "No more content");
        assert_eq!(sentence_page("", 0), "No more content");
    }

    #[test]
    fn maps_summary_with_fallback_url() {
        let summary: WikiSummary = serde_json::from_str(
            r#"{"title": "Rust (programming language)", "extract": "A language."}"#,
        )
        .unwrap();
        let item = map_response(summary, "Rust lang", 0);
        assert_eq!(item.source, "wikipedia");
        assert_eq!(item.title, "Rust (programming language)");
        assert_eq!(item.url, "https://en.wikipedia.org/wiki/Rust%20lang");
        assert_eq!(item.snippet, "A language.");
    }

    #[test]
    fn maps_desktop_url_when_present() {
        let summary: WikiSummary = serde_json::from_str(
            r#"{"title": "Ferris", "extract": "",
                "content_urls": {"desktop": {"page": "https://en.wikipedia.org/wiki/Ferris"}}}"#,
        )
        .unwrap();
        let item = map_response(summary, "ferris", 0);
        assert_eq!(item.url, "https://en.wikipedia.org/wiki/Ferris");
        assert_eq!(item.snippet, "No more content");
    }
}
