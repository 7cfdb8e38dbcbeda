use crate::error::{OrFlash, flash_redirect};
use crate::extract::RequireUser;
use crate::routes::{is_web_url, render};
use crate::server::AppState;
use crate::session::Session;
use crate::views::StudyLogPage;
use axum::extract::Path;
use axum::response::{Html, Redirect};
use axum::routing::{get, post};
use axum::{Extension, Form, Router};
use leptos::view;
use serde::Deserialize;
use std::sync::Arc;
use tracker_core::error::{Error as CoreError, Result as CoreResult};
use tracker_core::{FlashKind, NewStudyLogResource, StudyLogId, StudyLogRecord, UserRecord};

const DASHBOARD_PATH: &str = "/dashboard";

pub fn router() -> Router {
    Router::new()
        .route("/study-logs/{id}", get(show_log))
        .route("/study-logs/{id}/resources", post(add_resource))
        .route("/study-logs/{id}/delete", post(delete_log))
}

/// Either a JSON `resources` object or the discrete fields of the page form.
#[derive(Debug, Default, Deserialize)]
pub struct ResourceForm {
    pub resources: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub snippet: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceJson {
    title: Option<String>,
    snippet: Option<String>,
    source: Option<String>,
    url: Option<String>,
}

fn trimmed(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl ResourceForm {
    pub fn into_resource(self, study_log_id: StudyLogId) -> CoreResult<NewStudyLogResource> {
        let fields = match self.resources.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => serde_json::from_str::<ResourceJson>(raw)
                .map_err(|e| CoreError::InvalidInput(format!("resources: {e}")))?,
            _ => ResourceJson {
                title: self.title,
                snippet: self.snippet,
                source: self.source,
                url: self.url,
            },
        };
        match (trimmed(fields.title), trimmed(fields.url)) {
            (Some(_), Some(url)) if !is_web_url(&url) => Err(CoreError::InvalidInput(format!(
                "unsupported url {url:?}"
            ))),
            (Some(title), Some(url)) => Ok(NewStudyLogResource {
                study_log_id,
                title,
                snippet: trimmed(fields.snippet),
                source: trimmed(fields.source),
                url,
            }),
            _ => Err(CoreError::InvalidInput(
                "title and url are required".to_string(),
            )),
        }
    }
}

async fn owned_log(
    state: &AppState,
    session: &Session,
    user: &UserRecord,
    raw_id: &str,
    load_failed: &str,
) -> Result<StudyLogRecord, Redirect> {
    let found = match raw_id.parse::<StudyLogId>() {
        Ok(id) => state
            .db
            .get_study_log(user.id, id)
            .await
            .or_flash(session, load_failed, DASHBOARD_PATH)?,
        Err(_) => None,
    };
    found.ok_or_else(|| {
        flash_redirect(session, FlashKind::Error, "Study log not found", DASHBOARD_PATH)
    })
}

#[tracing::instrument(level = "debug", skip_all, fields(log = %raw_id))]
async fn show_log(
    Extension(state): Extension<Arc<AppState>>,
    session: Session,
    RequireUser(user): RequireUser,
    Path(raw_id): Path<String>,
) -> Result<Html<String>, Redirect> {
    let failed = "Could not load study log";
    let log = owned_log(&state, &session, &user, &raw_id, failed).await?;
    let resources = state
        .db
        .list_study_log_resources(log.id)
        .await
        .or_flash(&session, failed, DASHBOARD_PATH)?;

    let title = format!("Study Log #{}", log.id);
    Ok(render(&session, Some(&user), &title, move || {
        view! { <StudyLogPage log=log resources=resources /> }
    }))
}

#[tracing::instrument(level = "debug", skip_all, fields(log = %raw_id))]
async fn add_resource(
    Extension(state): Extension<Arc<AppState>>,
    session: Session,
    RequireUser(user): RequireUser,
    Path(raw_id): Path<String>,
    Form(form): Form<ResourceForm>,
) -> Result<Redirect, Redirect> {
    let failed = "Could not save resource";
    let log = owned_log(&state, &session, &user, &raw_id, failed).await?;
    let back = format!("/study-logs/{}", log.id);

    let resource = form
        .into_resource(log.id)
        .or_flash(&session, failed, &back)?;
    state
        .db
        .add_study_log_resource(&resource)
        .await
        .or_flash(&session, failed, &back)?;

    Ok(flash_redirect(
        &session,
        FlashKind::Success,
        "Resource added successfully",
        &back,
    ))
}

#[tracing::instrument(level = "debug", skip_all, fields(log = %raw_id))]
async fn delete_log(
    Extension(state): Extension<Arc<AppState>>,
    session: Session,
    RequireUser(user): RequireUser,
    Path(raw_id): Path<String>,
) -> Result<Redirect, Redirect> {
    let not_found = || {
        flash_redirect(
            &session,
            FlashKind::Error,
            "Study log not found",
            DASHBOARD_PATH,
        )
    };
    let Ok(log_id) = raw_id.parse::<StudyLogId>() else {
        return Err(not_found());
    };

    match state.db.delete_study_log_cascade(user.id, log_id).await {
        Ok(report) => {
            tracing::info!(%log_id, ?report, "study log deleted");
            Ok(flash_redirect(
                &session,
                FlashKind::Success,
                "Study log deleted successfully",
                DASHBOARD_PATH,
            ))
        }
        Err(CoreError::NotFound(_)) => Err(not_found()),
        Err(e) => Err(e).or_flash(&session, "Could not delete study log", DASHBOARD_PATH),
    }
}
