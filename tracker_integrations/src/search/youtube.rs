//! YouTube Data API v3 video search.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;
use tracker_core::{Error, Result, SearchPage, SearchProvider, SearchRequest, SearchResult};

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const MAX_RESULTS: &str = "6";

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct YoutubeSearchResponse {
    #[serde(default)]
    items: Vec<YoutubeItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YoutubeItem {
    #[serde(default)]
    id: YoutubeItemId,
    #[serde(default)]
    snippet: YoutubeSnippet,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct YoutubeItemId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct YoutubeSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_title: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    thumbnails: Option<YoutubeThumbnails>,
}

#[derive(Debug, Deserialize, Default)]
struct YoutubeThumbnails {
    #[serde(default)]
    default: Option<YoutubeThumbnail>,
}

#[derive(Debug, Deserialize)]
struct YoutubeThumbnail {
    url: String,
}

#[derive(Clone)]
pub struct YoutubeSearch {
    client: Client,
    api_base: String,
    api_key: Option<String>,
}

impl YoutubeSearch {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

fn map_response(resp: YoutubeSearchResponse) -> SearchPage {
    let results = resp
        .items
        .into_iter()
        .map(|item| {
            let video_id = item.id.video_id.unwrap_or_default();
            let thumbnail = item
                .snippet
                .thumbnails
                .and_then(|t| t.default)
                .map(|t| t.url);
            SearchResult {
                source: "Youtube".to_string(),
                title: item.snippet.title,
                url: format!("https://www.youtube.com/watch?v={video_id}"),
                snippet: item.snippet.description,
                extra: Some(serde_json::json!({
                    "channelTitle": item.snippet.channel_title,
                    "publishedAt": item.snippet.published_at,
                    "thumbnail": thumbnail,
                })),
            }
        })
        .collect();

    SearchPage {
        results,
        next_page_token: resp.next_page_token,
    }
}

#[async_trait]
impl SearchProvider for YoutubeSearch {
    fn name(&self) -> &'static str {
        "youtube"
    }

    fn missing_config(&self) -> Option<&'static str> {
        match self.api_key {
            Some(_) => None,
            None => Some("YOUTUBE_API_KEY not configured"),
        }
    }

    #[instrument(level = "info", skip(self), fields(q = %req.q))]
    async fn search(&self, req: &SearchRequest) -> Result<SearchPage> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("YOUTUBE_API_KEY not configured".to_string()))?;

        let mut query: Vec<(&str, &str)> = vec![
            ("key", key),
            ("q", req.q.as_str()),
            ("part", "snippet"),
            ("maxResults", MAX_RESULTS),
            ("type", "video"),
        ];
        if let Some(token) = req.page_token.as_deref().filter(|t| !t.is_empty()) {
            query.push(("pageToken", token));
        }

        let resp = self
            .client
            .get(format!("{}/search", self.api_base))
            .query(&query)
            .send()
            .await
            .map_err(Error::backend_reqwest)?
            .error_for_status()
            .map_err(Error::backend_reqwest)?;
        let body: YoutubeSearchResponse = resp.json().await.map_err(Error::backend_reqwest)?;

        let page = map_response(body);
        tracing::debug!(count = page.results.len(), "youtube results");
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "kind": "youtube#searchListResponse",
        "nextPageToken": "CAYQAA",
        "items": [
            {
                "id": {"kind": "youtube#video", "videoId": "dQw4w9WgXcQ"},
                "snippet": {
                    "publishedAt": "2009-10-25T06:57:33Z",
                    "title": "Ownership in Rust",
                    "description": "Borrowing explained.",
                    "channelTitle": "RustConf",
                    "thumbnails": {"default": {"url": "https://i.ytimg.com/vi/dQw4w9WgXcQ/default.jpg"}}
                }
            },
            {
                "id": {"kind": "youtube#video", "videoId": "abc123"},
                "snippet": {"title": "No thumbnails", "description": ""}
            }
        ]
    }"#;

    #[test]
    fn maps_videos_and_page_token() {
        let resp: YoutubeSearchResponse = serde_json::from_str(FIXTURE).unwrap();
        let page = map_response(resp);

        assert_eq!(page.next_page_token.as_deref(), Some("CAYQAA"));
        assert_eq!(page.results.len(), 2);

        let first = &page.results[0];
        assert_eq!(first.source, "Youtube");
        assert_eq!(first.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(first.snippet, "Borrowing explained.");
        let extra = first.extra.as_ref().unwrap();
        assert_eq!(extra["channelTitle"], "RustConf");
        assert_eq!(extra["publishedAt"], "2009-10-25T06:57:33Z");
        assert_eq!(
            extra["thumbnail"],
            "https://i.ytimg.com/vi/dQw4w9WgXcQ/default.jpg"
        );

        assert!(page.results[1].extra.as_ref().unwrap()["thumbnail"].is_null());
    }

    #[test]
    fn empty_response_has_no_token() {
        let page = map_response(serde_json::from_str("{}").unwrap());
        assert!(page.results.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn missing_key_is_reported_before_any_request() {
        let yt = YoutubeSearch::new(Client::new(), None);
        assert_eq!(yt.missing_config(), Some("YOUTUBE_API_KEY not configured"));
        let err = yt.search(&SearchRequest::new("rust")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
