use crate::session::Session;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::Redirect;
use std::convert::Infallible;
use tracker_core::{FlashKind, UserRecord};

pub const LOGIN_PATH: &str = "/authentication/login";

/// The user bound to the request's session, if any. Inserted by the session
/// middleware; absent middleware reads as anonymous.
#[derive(Debug, Clone, Default)]
pub struct MaybeUser(pub Option<UserRecord>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    #[tracing::instrument(level = "debug", name = "extract.maybe_user", skip_all)]
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<MaybeUser>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Authorization gate for pages: a logged-in user, or a redirect to the login
/// form carrying a flash.
#[derive(Debug, Clone)]
pub struct RequireUser(pub UserRecord);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = Redirect;

    #[tracing::instrument(level = "debug", name = "extract.require_user", skip_all)]
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(MaybeUser(Some(user))) = parts.extensions.get::<MaybeUser>() {
            return Ok(Self(user.clone()));
        }
        if let Some(session) = parts.extensions.get::<Session>() {
            session.flash(FlashKind::Error, "You must login to continue");
        }
        Err(Redirect::to(LOGIN_PATH))
    }
}
