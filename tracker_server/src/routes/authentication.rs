use crate::error::{OrFlash, flash_redirect};
use crate::extract::{LOGIN_PATH, MaybeUser};
use crate::routes::render;
use crate::server::AppState;
use crate::session::{self, Session};
use crate::views::{LoginPage, RegisterPage};
use axum::extract::Query;
use axum::response::{Html, Redirect};
use axum::routing::get;
use axum::{Extension, Form, Router};
use leptos::view;
use serde::Deserialize;
use std::sync::Arc;
use tracker_core::error::{Error as CoreError, Result as CoreResult};
use tracker_core::password::{hash_password, verify_password};
use tracker_core::{ExternalProfile, FlashKind, NewUser, PendingOAuth, TrackerDb, UserRecord};
use tracker_integrations::oauth::pkce_challenge;

const REGISTER_PATH: &str = "/authentication/register";
const DASHBOARD_PATH: &str = "/dashboard";

pub fn router() -> Router {
    Router::new()
        .route("/authentication/register", get(register_form).post(register))
        .route("/authentication/login", get(login_form).post(login))
        .route("/authentication/logout", get(logout).post(logout))
        .route("/authentication/google", get(google_start))
        .route("/authentication/google/callback", get(google_callback))
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[tracing::instrument(level = "debug", skip_all)]
async fn register_form(session: Session, MaybeUser(user): MaybeUser) -> Html<String> {
    render(&session, user.as_ref(), "Register", || view! { <RegisterPage /> })
}

#[tracing::instrument(level = "debug", skip_all)]
async fn login_form(
    Extension(state): Extension<Arc<AppState>>,
    session: Session,
    MaybeUser(user): MaybeUser,
) -> Html<String> {
    let google_enabled = state.identity.is_some();
    render(&session, user.as_ref(), "Login", move || {
        view! { <LoginPage google_enabled=google_enabled /> }
    })
}

#[tracing::instrument(level = "debug", skip_all)]
async fn register(
    Extension(state): Extension<Arc<AppState>>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Redirect, Redirect> {
    let email = form.email.trim().to_string();
    if email.is_empty() || form.password.is_empty() {
        return Err(flash_redirect(
            &session,
            FlashKind::Error,
            "You need to enter email and password",
            REGISTER_PATH,
        ));
    }

    let password = form.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .or_flash(&session, "Registration failed", REGISTER_PATH)?
        .or_flash(&session, "Registration failed", REGISTER_PATH)?;

    let username = match form.username.trim() {
        "" => email.clone(),
        name => name.to_string(),
    };
    let user = state
        .db
        .create_user(&NewUser {
            email,
            username,
            password_hash: Some(password_hash),
            google_id: None,
        })
        .await
        .or_flash(&session, "Registration failed", REGISTER_PATH)?;

    tracing::info!(user_id = %user.id, "registered");
    session.login(user.id);
    Ok(flash_redirect(
        &session,
        FlashKind::Success,
        "Account created successfully",
        DASHBOARD_PATH,
    ))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn login(
    Extension(state): Extension<Arc<AppState>>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Redirect, Redirect> {
    let rejected = "Incorrect email or password";
    let user = state
        .db
        .find_user_by_email(form.email.trim())
        .await
        .or_flash(&session, rejected, LOGIN_PATH)?;

    let Some((user, phc)) = user.and_then(|u| u.password_hash.clone().map(|h| (u, h))) else {
        return Err(flash_redirect(&session, FlashKind::Error, rejected, LOGIN_PATH));
    };
    let password = form.password;
    let ok = tokio::task::spawn_blocking(move || verify_password(&phc, &password))
        .await
        .or_flash(&session, rejected, LOGIN_PATH)?;
    if !ok {
        tracing::debug!(user_id = %user.id, "password mismatch");
        return Err(flash_redirect(&session, FlashKind::Error, rejected, LOGIN_PATH));
    }

    session.login(user.id);
    Ok(flash_redirect(
        &session,
        FlashKind::Success,
        "You have logged in successfully",
        DASHBOARD_PATH,
    ))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn logout(session: Session) -> Redirect {
    session.logout();
    Redirect::to("/")
}

#[tracing::instrument(level = "debug", skip_all)]
async fn google_start(
    Extension(state): Extension<Arc<AppState>>,
    session: Session,
) -> Result<Redirect, Redirect> {
    let Some(identity) = state.identity.as_ref() else {
        return Err(flash_redirect(
            &session,
            FlashKind::Error,
            "Google sign-in is not configured",
            LOGIN_PATH,
        ));
    };

    let tokens = session::random_token(16).and_then(|s| Ok((s, session::random_token(32)?)));
    let (oauth_state, code_verifier) =
        tokens.or_flash(&session, "Google sign-in failed", LOGIN_PATH)?;
    let url = identity.authorize_url(&oauth_state, &pkce_challenge(&code_verifier));
    session.set_oauth(PendingOAuth {
        state: oauth_state,
        code_verifier,
    });
    Ok(Redirect::to(&url))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn google_callback(
    Extension(state): Extension<Arc<AppState>>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, Redirect> {
    let failed = "Google sign-in failed";
    let Some(identity) = state.identity.as_ref() else {
        return Err(flash_redirect(
            &session,
            FlashKind::Error,
            "Google sign-in is not configured",
            LOGIN_PATH,
        ));
    };

    let pending = session.take_oauth();
    if let Some(error) = &query.error {
        tracing::warn!(%error, "google returned an error");
        return Err(flash_redirect(&session, FlashKind::Error, failed, LOGIN_PATH));
    }
    let (Some(code), Some(returned_state), Some(pending)) = (query.code, query.state, pending)
    else {
        tracing::warn!("google callback without code, state or pending sign-in");
        return Err(flash_redirect(&session, FlashKind::Error, failed, LOGIN_PATH));
    };
    if returned_state != pending.state {
        tracing::warn!("google callback state mismatch");
        return Err(flash_redirect(&session, FlashKind::Error, failed, LOGIN_PATH));
    }

    let profile = identity
        .exchange(&code, &pending.code_verifier)
        .await
        .or_flash(&session, failed, LOGIN_PATH)?;
    let user = resolve_google_user(state.db.as_ref(), &profile)
        .await
        .or_flash(&session, failed, LOGIN_PATH)?;

    session.login(user.id);
    Ok(flash_redirect(
        &session,
        FlashKind::Success,
        "You have logged in successfully",
        DASHBOARD_PATH,
    ))
}

/// Find the account for a Google profile: by Google id, then by email (linking
/// the id on first use), else create one.
pub async fn resolve_google_user(
    db: &dyn TrackerDb,
    profile: &ExternalProfile,
) -> CoreResult<UserRecord> {
    let email = profile.email.as_deref();
    if let Some(mut user) = db.find_user_for_google(&profile.google_id, email).await? {
        if user.google_id.is_none() {
            db.link_google_id(user.id, &profile.google_id).await?;
            tracing::info!(user_id = %user.id, "linked google account");
            user.google_id = Some(profile.google_id.clone());
        }
        return Ok(user);
    }

    let email = email.ok_or_else(|| {
        CoreError::InvalidInput("google account has no email address".to_string())
    })?;
    let username = profile.name.clone().unwrap_or_else(|| email.to_string());
    let user = db
        .create_user(&NewUser {
            email: email.to_string(),
            username,
            password_hash: None,
            google_id: Some(profile.google_id.clone()),
        })
        .await?;
    tracing::info!(user_id = %user.id, "registered via google");
    Ok(user)
}
