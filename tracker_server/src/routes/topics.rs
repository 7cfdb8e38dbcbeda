use crate::error::{OrFlash, flash_redirect};
use crate::extract::RequireUser;
use crate::routes::{is_web_url, render};
use crate::server::AppState;
use crate::session::Session;
use crate::views::{NewTopicPage, TopicPage};
use axum::extract::Path;
use axum::response::{Html, Redirect};
use axum::routing::{get, post};
use axum::{Extension, Form, Router};
use leptos::view;
use serde::Deserialize;
use std::sync::Arc;
use tracker_core::error::{Error as CoreError, Result as CoreResult};
use tracker_core::slug::slugify;
use tracker_core::{
    FlashKind, NewResource, NewStudyLog, NewStudyLogResource, NewTopic, TopicId, TopicRecord,
    UserRecord,
};

const DASHBOARD_PATH: &str = "/dashboard";

pub fn router() -> Router {
    Router::new()
        .route("/topics", post(create_topic))
        .route("/topics/new", get(new_topic_form))
        .route("/topics/{id}", get(show_topic))
        .route("/topics/{id}/logs", post(create_log))
        .route("/topics/{id}/logs/saveMultiple", post(create_log_with_resources))
        .route("/topics/{id}/delete", post(delete_topic))
}

#[derive(Debug, Default, Deserialize)]
pub struct TopicForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogForm {
    #[serde(default)]
    pub minutes: String,
    #[serde(default)]
    pub notes: String,
    /// JSON array of [`PickedResource`] chosen in the search widget.
    #[serde(default)]
    pub resources: String,
}

/// A search hit the user ticked before saving a log.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PickedResource {
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub url: Option<String>,
    pub source: Option<String>,
    pub extra: Option<serde_json::Value>,
}

/// Integer minutes from a form field: leading digits win, anything else is 0.
pub fn parse_minutes(raw: &str) -> i64 {
    let s = raw.trim();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map(|n| sign * n).unwrap_or(0)
}

pub fn parse_picked(raw: &str) -> CoreResult<Vec<PickedResource>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let picked: Vec<PickedResource> = serde_json::from_str(raw)
        .map_err(|e| CoreError::InvalidInput(format!("resources: {e}")))?;
    if let Some(bad) = picked
        .iter()
        .filter_map(|r| r.url.as_deref())
        .find(|u| !is_web_url(u))
    {
        return Err(CoreError::InvalidInput(format!(
            "resources: unsupported url {bad:?}"
        )));
    }
    Ok(picked)
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Slug for a new topic; falls back to the current epoch millis when the
/// title has nothing to slug.
fn topic_slug(title: &str) -> String {
    match slugify(title) {
        slug if !slug.is_empty() => slug,
        _ => chrono::Utc::now().timestamp_millis().to_string(),
    }
}

/// Load a topic the user owns, redirecting to the dashboard when absent.
async fn owned_topic(
    state: &AppState,
    session: &Session,
    user: &UserRecord,
    raw_id: &str,
    load_failed: &str,
) -> Result<TopicRecord, Redirect> {
    let found = match raw_id.parse::<TopicId>() {
        Ok(id) => state
            .db
            .get_topic(user.id, id)
            .await
            .or_flash(session, load_failed, DASHBOARD_PATH)?,
        Err(_) => None,
    };
    found.ok_or_else(|| {
        flash_redirect(session, FlashKind::Error, "Topic not found", DASHBOARD_PATH)
    })
}

#[tracing::instrument(level = "debug", skip_all)]
async fn new_topic_form(session: Session, RequireUser(user): RequireUser) -> Html<String> {
    render(&session, Some(&user), "New topic", || view! { <NewTopicPage /> })
}

#[tracing::instrument(level = "debug", skip_all)]
async fn create_topic(
    Extension(state): Extension<Arc<AppState>>,
    session: Session,
    RequireUser(user): RequireUser,
    Form(form): Form<TopicForm>,
) -> Result<Redirect, Redirect> {
    let topic = state
        .db
        .create_topic(&NewTopic {
            user_id: user.id,
            slug: topic_slug(&form.title),
            title: form.title.trim().to_string(),
            description: non_empty(&form.description),
        })
        .await
        .or_flash(&session, "Could not create topic", "/topics/new")?;

    tracing::info!(topic_id = %topic.id, slug = %topic.slug, "topic created");
    Ok(flash_redirect(
        &session,
        FlashKind::Success,
        "Topic created successfully",
        DASHBOARD_PATH,
    ))
}

#[tracing::instrument(level = "debug", skip_all, fields(topic = %raw_id))]
async fn show_topic(
    Extension(state): Extension<Arc<AppState>>,
    session: Session,
    RequireUser(user): RequireUser,
    Path(raw_id): Path<String>,
) -> Result<Html<String>, Redirect> {
    let failed = "Couldn't load topic";
    let topic = owned_topic(&state, &session, &user, &raw_id, failed).await?;
    let resources = state
        .db
        .list_topic_resources(topic.id)
        .await
        .or_flash(&session, failed, DASHBOARD_PATH)?;
    let logs = state
        .db
        .list_topic_study_logs(user.id, topic.id)
        .await
        .or_flash(&session, failed, DASHBOARD_PATH)?;

    let title = topic.title.clone();
    Ok(render(&session, Some(&user), &title, move || {
        view! { <TopicPage topic=topic resources=resources logs=logs /> }
    }))
}

/// Save a study log and attach the picked search results to the topic.
#[tracing::instrument(level = "debug", skip_all, fields(topic = %raw_id))]
async fn create_log(
    Extension(state): Extension<Arc<AppState>>,
    session: Session,
    RequireUser(user): RequireUser,
    Path(raw_id): Path<String>,
    Form(form): Form<LogForm>,
) -> Result<Redirect, Redirect> {
    let failed = "Could not save study log";
    let topic = owned_topic(&state, &session, &user, &raw_id, failed).await?;
    let back = format!("/topics/{}", topic.id);
    let picked = parse_picked(&form.resources).or_flash(&session, failed, &back)?;

    let log = state
        .db
        .create_study_log(&NewStudyLog {
            user_id: user.id,
            topic_id: topic.id,
            duration_in_minutes: parse_minutes(&form.minutes),
            notes: non_empty(&form.notes),
        })
        .await
        .or_flash(&session, failed, &back)?;

    for r in picked {
        state
            .db
            .add_resource(&NewResource {
                topic_id: topic.id,
                source: r.source,
                title: r.title,
                url: r.url,
                snippet: r.snippet,
                extra: r.extra,
            })
            .await
            .or_flash(&session, failed, &back)?;
    }

    tracing::info!(log_id = %log.id, "study log saved");
    Ok(flash_redirect(
        &session,
        FlashKind::Success,
        "Study log and selected resources saved successfully",
        &back,
    ))
}

/// Save a study log with the picked search results attached to the log itself.
#[tracing::instrument(level = "debug", skip_all, fields(topic = %raw_id))]
async fn create_log_with_resources(
    Extension(state): Extension<Arc<AppState>>,
    session: Session,
    RequireUser(user): RequireUser,
    Path(raw_id): Path<String>,
    Form(form): Form<LogForm>,
) -> Result<Redirect, Redirect> {
    let failed = "Could not save study log.";
    let topic = owned_topic(&state, &session, &user, &raw_id, failed).await?;
    let back = format!("/topics/{}", topic.id);

    let picked = parse_picked(&form.resources)
        .and_then(|items| {
            items
                .into_iter()
                .map(|r| match (r.title, r.url) {
                    (Some(title), Some(url)) => Ok((title, url, r.snippet, r.source)),
                    _ => Err(CoreError::InvalidInput(
                        "every resource needs a title and url".to_string(),
                    )),
                })
                .collect::<CoreResult<Vec<_>>>()
        })
        .or_flash(&session, failed, &back)?;

    let log = state
        .db
        .create_study_log(&NewStudyLog {
            user_id: user.id,
            topic_id: topic.id,
            duration_in_minutes: parse_minutes(&form.minutes),
            notes: non_empty(&form.notes),
        })
        .await
        .or_flash(&session, failed, &back)?;

    for (title, url, snippet, source) in picked {
        state
            .db
            .add_study_log_resource(&NewStudyLogResource {
                study_log_id: log.id,
                title,
                snippet,
                source,
                url,
            })
            .await
            .or_flash(&session, failed, &back)?;
    }

    Ok(flash_redirect(
        &session,
        FlashKind::Success,
        "Study log and resources saved!",
        &back,
    ))
}

#[tracing::instrument(level = "debug", skip_all, fields(topic = %raw_id))]
async fn delete_topic(
    Extension(state): Extension<Arc<AppState>>,
    session: Session,
    RequireUser(user): RequireUser,
    Path(raw_id): Path<String>,
) -> Result<Redirect, Redirect> {
    let Ok(topic_id) = raw_id.parse::<TopicId>() else {
        return Err(flash_redirect(
            &session,
            FlashKind::Error,
            "Topic not found",
            DASHBOARD_PATH,
        ));
    };

    match state.db.delete_topic_cascade(user.id, topic_id).await {
        Ok(report) => {
            tracing::info!(%topic_id, ?report, "topic deleted");
            Ok(flash_redirect(
                &session,
                FlashKind::Success,
                "Topic and all related logs/resources deleted successfully",
                DASHBOARD_PATH,
            ))
        }
        Err(CoreError::NotFound(_)) => Err(flash_redirect(
            &session,
            FlashKind::Error,
            "Topic not found",
            DASHBOARD_PATH,
        )),
        Err(e) => Err(e).or_flash(&session, "Could not delete topic", DASHBOARD_PATH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_take_leading_digits() {
        assert_eq!(parse_minutes("45"), 45);
        assert_eq!(parse_minutes(" 12abc"), 12);
        assert_eq!(parse_minutes("abc"), 0);
        assert_eq!(parse_minutes(""), 0);
        assert_eq!(parse_minutes("-5"), -5);
    }

    #[test]
    fn picked_resources_accept_partial_items() {
        let items = parse_picked(r#"[{"title":"T","url":"https://x"},{"snippet":"s"}]"#).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url.as_deref(), Some("https://x"));
        assert!(items[1].title.is_none());
        assert!(parse_picked("").unwrap().is_empty());
        assert!(parse_picked("{not json").is_err());
        assert!(parse_picked(r#"[{"title":"T","url":"javascript:alert(1)"}]"#).is_err());
    }

    #[test]
    fn blank_titles_get_a_timestamp_slug() {
        assert_eq!(topic_slug("Rust Ownership"), "rust-ownership");
        let fallback = topic_slug("   ");
        assert!(!fallback.is_empty());
        assert!(fallback.chars().all(|c| c.is_ascii_digit()));
    }
}
