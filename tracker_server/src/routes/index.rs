use crate::error::{OrFlash, flash_redirect};
use crate::extract::{LOGIN_PATH, MaybeUser};
use crate::routes::render;
use crate::server::AppState;
use crate::session::Session;
use crate::views::{DashboardPage, IndexPage, NotFoundPage};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Extension, Router};
use leptos::view;
use std::sync::Arc;
use tracker_core::FlashKind;

const RECENT_LOGS: usize = 20;

pub fn router() -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/dashboard", get(dashboard))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn landing(session: Session, MaybeUser(user): MaybeUser) -> Html<String> {
    let username = user.as_ref().map(|u| u.username.clone());
    render(&session, user.as_ref(), "Welcome", move || {
        view! { <IndexPage username=username /> }
    })
}

#[tracing::instrument(level = "debug", skip_all)]
async fn dashboard(
    Extension(state): Extension<Arc<AppState>>,
    session: Session,
    MaybeUser(user): MaybeUser,
) -> Result<Html<String>, Redirect> {
    let Some(user) = user else {
        return Err(flash_redirect(
            &session,
            FlashKind::Error,
            "You must login",
            LOGIN_PATH,
        ));
    };

    let topics = state
        .db
        .list_topics(user.id)
        .await
        .or_flash(&session, "Could not load dashboard.", "/")?;
    let logs = state
        .db
        .list_recent_study_logs(user.id, RECENT_LOGS)
        .await
        .or_flash(&session, "Could not load dashboard.", "/")?;

    let username = user.username.clone();
    Ok(render(&session, Some(&user), "Dashboard", move || {
        view! { <DashboardPage username=username topics=topics logs=logs /> }
    }))
}

#[tracing::instrument(level = "debug", skip_all)]
pub async fn not_found(session: Session, MaybeUser(user): MaybeUser) -> Response {
    let page = render(&session, user.as_ref(), "Not found", || view! { <NotFoundPage /> });
    (StatusCode::NOT_FOUND, page).into_response()
}
