use crate::session::Session;
use crate::views;
use axum::Router;
use axum::response::Html;
use axum::routing::get;
use leptos::IntoView;
use tracker_core::UserRecord;

pub mod api;
pub mod authentication;
pub mod health;
pub mod index;
pub mod study_logs;
pub mod topics;

#[tracing::instrument(level = "debug", skip_all)]
pub fn router() -> Router {
    Router::new()
        .merge(index::router())
        .merge(authentication::router())
        .merge(topics::router())
        .merge(study_logs::router())
        .merge(api::router())
        .route("/health", get(health::get_health))
}

/// Whether a user-supplied link is an absolute `http` or `https` URL. Anything
/// else (`javascript:`, `data:`, relative paths) is refused before storage.
pub(crate) fn is_web_url(raw: &str) -> bool {
    url::Url::parse(raw.trim())
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Render a page body and wrap it in the shell, consuming pending flashes.
pub(crate) fn render<F, N>(
    session: &Session,
    user: Option<&UserRecord>,
    title: &str,
    body: F,
) -> Html<String>
where
    F: FnOnce() -> N + 'static,
    N: IntoView,
{
    let body = leptos::ssr::render_to_string(body);
    views::render_page(title, user, session.take_flashes(), &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_http_links_are_accepted() {
        assert!(is_web_url("https://en.wikipedia.org/wiki/Rust"));
        assert!(is_web_url(" http://example.com "));
        assert!(!is_web_url("javascript:alert(1)"));
        assert!(!is_web_url("JavaScript:alert(1)"));
        assert!(!is_web_url("data:text/html,<b>x</b>"));
        assert!(!is_web_url("/relative/path"));
        assert!(!is_web_url(""));
    }
}
