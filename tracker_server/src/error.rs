use crate::session::Session;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Serialize;
use tracker_core::FlashKind;
use tracker_core::error as core_error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Errors of the JSON `/api` routes. The `Display` text is the response body.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("q is required")]
    MissingQuery,

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    NotConfigured(&'static str),

    /// Downstream failure; the body is the provider's fixed message, the
    /// cause is only logged.
    #[error("{message}")]
    Provider {
        message: &'static str,
        #[source]
        source: core_error::Error,
    },

    #[error("{0}")]
    Core(#[from] core_error::Error),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingQuery | ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotConfigured(_) | ApiError::Provider { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Core(err) => match err {
                core_error::Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
                core_error::Error::NotFound(_) => StatusCode::NOT_FOUND,
                core_error::Error::Conflict(_) => StatusCode::CONFLICT,
                core_error::Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                core_error::Error::Backend { .. } | core_error::Error::BackendMessage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        let error = match &self {
            ApiError::Provider { message, source } => {
                tracing::error!(error = %source, "{message}");
                message.to_string()
            }
            ApiError::Core(err) if code.is_server_error() => {
                tracing::error!(error = %err, "api request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (code, Json(ErrorBody { error })).into_response()
    }
}

/// Queue a flash and redirect. The building block of every page error path.
pub fn flash_redirect(session: &Session, kind: FlashKind, message: &str, to: &str) -> Redirect {
    session.flash(kind, message);
    Redirect::to(to)
}

/// Page-handler error path: log the cause, flash a generic message, redirect.
pub trait OrFlash<T> {
    fn or_flash(self, session: &Session, message: &str, fallback: &str) -> Result<T, Redirect>;
}

impl<T, E> OrFlash<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn or_flash(self, session: &Session, message: &str, fallback: &str) -> Result<T, Redirect> {
        self.map_err(|e| {
            tracing::error!(error = %e, fallback, "{message}");
            flash_redirect(session, FlashKind::Error, message, fallback)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_variants() {
        assert_eq!(ApiError::MissingQuery.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Unauthorized("login required".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::NotFound("topic not found".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Provider {
                message: "wiki fetch failed",
                source: core_error::Error::BackendMessage("503".into()),
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Core(core_error::Error::Conflict("dup".into())).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn provider_body_hides_the_cause() {
        let err = ApiError::Provider {
            message: "duck fetch failed",
            source: core_error::Error::BackendMessage("connection reset".into()),
        };
        assert_eq!(err.to_string(), "duck fetch failed");
    }
}
