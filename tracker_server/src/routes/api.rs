//! JSON search proxies used by the topic page's search widget.
//!
//! `GET /api/{youtube,duck,wiki}?q=..&page=..[&pageToken=..][&topic_id=..]`.
//! With `topic_id` the results are also stored as resources of that topic,
//! which must belong to the signed-in user.

use crate::error::ApiError;
use crate::extract::MaybeUser;
use crate::server::AppState;
use axum::extract::Query;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracker_core::{NewResource, SearchProvider, SearchRequest, TopicId};

pub fn router() -> Router {
    Router::new()
        .route("/api/youtube", get(youtube))
        .route("/api/duck", get(duck))
        .route("/api/wiki", get(wiki))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<String>,
    #[serde(rename = "pageToken")]
    pub page_token: Option<String>,
    pub topic_id: Option<String>,
}

#[tracing::instrument(level = "debug", skip_all)]
async fn youtube(
    Extension(state): Extension<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let (results, next) = run_search(
        &state,
        state.youtube.as_ref(),
        "YouTube fetch failed",
        user.map(|u| u.id),
        query,
    )
    .await?;
    Ok(Json(json!({ "results": results, "nextPageToken": next })))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn duck(
    Extension(state): Extension<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let (results, _) = run_search(
        &state,
        state.duck.as_ref(),
        "duck fetch failed",
        user.map(|u| u.id),
        query,
    )
    .await?;
    Ok(Json(json!({ "results": results })))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn wiki(
    Extension(state): Extension<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let (results, _) = run_search(
        &state,
        state.wiki.as_ref(),
        "wiki fetch failed",
        user.map(|u| u.id),
        query,
    )
    .await?;
    Ok(Json(json!({ "results": results })))
}

async fn run_search(
    state: &AppState,
    provider: &dyn SearchProvider,
    failure: &'static str,
    user_id: Option<tracker_core::UserId>,
    query: SearchQuery,
) -> Result<(Vec<tracker_core::SearchResult>, Option<String>), ApiError> {
    let q = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or(ApiError::MissingQuery)?;
    if let Some(reason) = provider.missing_config() {
        return Err(ApiError::NotConfigured(reason));
    }

    let save_to = match query.topic_id.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => {
            let user_id =
                user_id.ok_or_else(|| ApiError::Unauthorized("login required".to_string()))?;
            let topic_id = raw
                .parse::<TopicId>()
                .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
            state
                .db
                .get_topic(user_id, topic_id)
                .await
                .map_err(|source| ApiError::Provider {
                    message: failure,
                    source,
                })?
                .ok_or_else(|| ApiError::NotFound("topic not found".to_string()))?;
            Some(topic_id)
        }
        _ => None,
    };

    let req = SearchRequest {
        q: q.to_string(),
        page: query
            .page
            .as_deref()
            .and_then(|p| p.trim().parse::<usize>().ok())
            .unwrap_or(0),
        page_token: query.page_token.filter(|t| !t.is_empty()),
    };
    let page = provider
        .search(&req)
        .await
        .map_err(|source| ApiError::Provider {
            message: failure,
            source,
        })?;
    tracing::debug!(provider = provider.name(), hits = page.results.len(), "search done");

    if let Some(topic_id) = save_to {
        for r in &page.results {
            state
                .db
                .add_resource(&NewResource {
                    topic_id,
                    source: Some(r.source.clone()),
                    title: Some(r.title.clone()),
                    url: Some(r.url.clone()),
                    snippet: Some(r.snippet.clone()),
                    extra: r.extra.clone(),
                })
                .await
                .map_err(|source| ApiError::Provider {
                    message: failure,
                    source,
                })?;
        }
        tracing::info!(%topic_id, saved = page.results.len(), "search results stored");
    }

    Ok((page.results, page.next_page_token))
}
