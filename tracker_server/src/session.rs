//! Cookie-keyed server-side sessions.
//!
//! The browser holds `kt.sid=<token>.<hmac>`; the `sessions` table holds
//! `sha256(token)`, the bound user and the pending flashes / OAuth state.
//! A middleware loads the session before the handler runs and writes back
//! whatever the handler changed afterwards.

use crate::extract::MaybeUser;
use crate::server::AppState;
use axum::extract::{FromRequestParts, Request};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracker_core::{
    Error as CoreError, Flash, FlashKind, PendingOAuth, Result as CoreResult, SessionConfig,
    SessionData, SessionRecord, TrackerDb, UserId,
};

pub const COOKIE_NAME: &str = "kt.sid";

type HmacSha256 = Hmac<Sha256>;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    let out = h.finalize();
    let mut s = String::with_capacity(out.len() * 2);
    for b in out {
        use std::fmt::Write as _;
        let _ = write!(&mut s, "{:02x}", b);
    }
    s
}

/// URL-safe random string with `bytes` bytes of entropy.
pub fn random_token(bytes: usize) -> CoreResult<String> {
    let mut buf = vec![0u8; bytes];
    getrandom::getrandom(&mut buf)
        .map_err(|e| CoreError::BackendMessage(format!("random token: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(buf))
}

fn mac(secret: &str) -> CoreResult<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CoreError::BackendMessage(format!("session hmac key: {e}")))
}

/// `<token>.<base64url(hmac_sha256(secret, token))>`
pub fn sign_token(secret: &str, token: &str) -> CoreResult<String> {
    let mut m = mac(secret)?;
    m.update(token.as_bytes());
    let sig = URL_SAFE_NO_PAD.encode(m.finalize().into_bytes());
    Ok(format!("{token}.{sig}"))
}

/// The token inside a signed cookie value, or `None` if the signature is wrong.
pub fn verify_token(secret: &str, value: &str) -> Option<String> {
    let (token, sig) = value.rsplit_once('.')?;
    if token.is_empty() {
        return None;
    }
    let sig = URL_SAFE_NO_PAD.decode(sig).ok()?;
    let mut m = mac(secret).ok()?;
    m.update(token.as_bytes());
    m.verify_slice(&sig).ok()?;
    Some(token.to_string())
}

/// Value of `name` across all `Cookie` headers (first match wins).
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
}

fn set_cookie(cfg: &SessionConfig, value: &str, max_age_secs: u64) -> String {
    let mut cookie =
        format!("{COOKIE_NAME}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if cfg.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

#[derive(Debug, Default)]
pub struct SessionState {
    /// Row the request arrived with, if it was valid and live.
    loaded: Option<SessionRecord>,
    /// Row to drop because it expired.
    stale_hash: Option<String>,
    user_id: Option<UserId>,
    data: SessionData,
    dirty: bool,
    rotate: bool,
    destroyed: bool,
}

/// Handle to the current request's session, shared between the middleware
/// and the handler.
#[derive(Clone, Debug, Default)]
pub struct Session(Arc<Mutex<SessionState>>);

impl Session {
    fn from_state(state: SessionState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.lock().user_id
    }

    /// Bind the session to `user_id` under a fresh token.
    pub fn login(&self, user_id: UserId) {
        let mut s = self.lock();
        s.user_id = Some(user_id);
        s.data.oauth = None;
        s.rotate = true;
        s.dirty = true;
    }

    pub fn logout(&self) {
        let mut s = self.lock();
        s.user_id = None;
        s.data = SessionData::default();
        s.destroyed = true;
        s.dirty = true;
    }

    pub fn flash(&self, kind: FlashKind, message: impl Into<String>) {
        let mut s = self.lock();
        s.data.flashes.push(Flash {
            kind,
            message: message.into(),
        });
        s.dirty = true;
    }

    pub fn take_flashes(&self) -> Vec<Flash> {
        let mut s = self.lock();
        if s.data.flashes.is_empty() {
            return Vec::new();
        }
        s.dirty = true;
        std::mem::take(&mut s.data.flashes)
    }

    pub fn set_oauth(&self, pending: PendingOAuth) {
        let mut s = self.lock();
        s.data.oauth = Some(pending);
        s.dirty = true;
    }

    /// Pending OAuth state, consumed on read.
    pub fn take_oauth(&self) -> Option<PendingOAuth> {
        let mut s = self.lock();
        let pending = s.data.oauth.take();
        if pending.is_some() {
            s.dirty = true;
        }
        pending
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "session layer missing"))
    }
}

/// Resolve the cookie to a session row. Any problem yields an anonymous session.
#[tracing::instrument(level = "debug", skip_all)]
pub async fn load(
    db: &dyn TrackerDb,
    cfg: &SessionConfig,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> SessionState {
    let mut state = SessionState::default();
    let Some(raw) = cookie_value(headers, COOKIE_NAME) else {
        return state;
    };
    let Some(token) = verify_token(&cfg.secret, &raw) else {
        tracing::debug!("ignoring session cookie with bad signature");
        return state;
    };
    let hash = sha256_hex(token.as_bytes());

    match db.get_session(&hash).await {
        Ok(Some(rec)) if rec.is_expired(now) => {
            state.stale_hash = Some(rec.token_hash);
        }
        Ok(Some(rec)) => {
            state.user_id = rec.user_id;
            state.data = rec.data.clone();
            state.loaded = Some(rec);
        }
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "failed to load session"),
    }
    state
}

/// Persist the handler's changes; returns the `Set-Cookie` value to send, if any.
#[tracing::instrument(level = "debug", skip_all)]
pub async fn commit(
    db: &dyn TrackerDb,
    cfg: &SessionConfig,
    session: &Session,
    now: DateTime<Utc>,
) -> CoreResult<Option<String>> {
    let (stale, loaded, user_id, data, dirty, rotate, destroyed) = {
        let mut s = session.lock();
        (
            s.stale_hash.take(),
            s.loaded.take(),
            s.user_id,
            std::mem::take(&mut s.data),
            s.dirty,
            s.rotate,
            s.destroyed,
        )
    };

    if let Some(hash) = stale {
        db.delete_session(&hash).await?;
    }
    if !dirty {
        return Ok(None);
    }

    let mut current = loaded;
    if rotate || destroyed {
        if let Some(old) = current.take() {
            db.delete_session(&old.token_hash).await?;
        }
    }

    if let Some(mut rec) = current {
        rec.user_id = user_id;
        rec.data = data;
        db.update_session(&rec).await?;
        return Ok(None);
    }

    if user_id.is_none() && data.is_empty() {
        return Ok(destroyed.then(|| set_cookie(cfg, "", 0)));
    }

    let token = random_token(32)?;
    let ttl = chrono::Duration::from_std(cfg.ttl).unwrap_or_else(|_| chrono::Duration::days(15));
    db.insert_session(&SessionRecord {
        token_hash: sha256_hex(token.as_bytes()),
        user_id,
        data,
        created_at: now,
        expires_at: now + ttl,
    })
    .await?;

    let signed = sign_token(&cfg.secret, &token)?;
    Ok(Some(set_cookie(cfg, &signed, cfg.ttl.as_secs())))
}

/// Loads the session and current user, runs the handler, then commits.
pub async fn session_middleware(mut req: Request, next: Next) -> Response {
    let Some(state) = req.extensions().get::<Arc<AppState>>().cloned() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "app state missing").into_response();
    };
    let cfg = &state.config.session;
    let db = state.db.as_ref();

    let mut loaded = load(db, cfg, req.headers(), Utc::now()).await;

    let user = match loaded.user_id {
        Some(user_id) => match db.get_user(user_id).await {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                tracing::warn!(%user_id, "session points at a missing user");
                loaded.user_id = None;
                loaded.dirty = true;
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load session user");
                None
            }
        },
        None => None,
    };

    let session = Session::from_state(loaded);
    req.extensions_mut().insert(session.clone());
    req.extensions_mut().insert(MaybeUser(user));

    let mut response = next.run(req).await;

    match commit(db, cfg, &session, Utc::now()).await {
        Ok(Some(cookie)) => match HeaderValue::from_str(&cookie) {
            Ok(v) => {
                response.headers_mut().append(SET_COOKIE, v);
            }
            Err(e) => tracing::error!(error = %e, "invalid session cookie header"),
        },
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "failed to save session"),
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tracker_core::{NewUser, SqliteTrackerDb};

    fn cfg() -> SessionConfig {
        SessionConfig {
            secret: "test-secret".into(),
            ttl: Duration::from_secs(3600),
            cookie_secure: false,
        }
    }

    fn headers_with(cookie: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        h
    }

    fn cookie_pair(set_cookie: &str) -> String {
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[test]
    fn signed_tokens_verify_and_tampering_fails() {
        let signed = sign_token("k1", "abc").unwrap();
        assert_eq!(verify_token("k1", &signed).as_deref(), Some("abc"));
        assert!(verify_token("k2", &signed).is_none());
        assert!(verify_token("k1", &signed.replacen("abc", "abd", 1)).is_none());
        assert!(verify_token("k1", "no-signature").is_none());
        assert!(verify_token("k1", ".sig").is_none());
    }

    #[test]
    fn cookie_lookup_handles_multiple_pairs() {
        let h = headers_with("theme=dark; kt.sid=tok.sig ; other=1");
        assert_eq!(cookie_value(&h, COOKIE_NAME).as_deref(), Some("tok.sig"));
        assert!(cookie_value(&h, "missing").is_none());
    }

    #[test]
    fn secure_flag_is_optional() {
        let mut c = cfg();
        assert!(!set_cookie(&c, "v", 10).contains("Secure"));
        c.cookie_secure = true;
        assert!(set_cookie(&c, "v", 10).ends_with("; Secure"));
    }

    #[tokio::test]
    async fn anonymous_request_without_changes_writes_nothing() {
        let db = SqliteTrackerDb::in_memory().await.unwrap();
        let state = load(&db, &cfg(), &HeaderMap::new(), Utc::now()).await;
        let session = Session::from_state(state);
        assert!(session.take_flashes().is_empty());
        assert_eq!(commit(&db, &cfg(), &session, Utc::now()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn flashes_survive_one_round_trip() {
        let db = SqliteTrackerDb::in_memory().await.unwrap();
        let now = Utc::now();

        let first = Session::from_state(load(&db, &cfg(), &HeaderMap::new(), now).await);
        first.flash(FlashKind::Error, "Topic not found");
        let set = commit(&db, &cfg(), &first, now).await.unwrap().unwrap();
        let pair = cookie_pair(&set);

        let second = Session::from_state(load(&db, &cfg(), &headers_with(&pair), now).await);
        let flashes = second.take_flashes();
        assert_eq!(flashes.len(), 1);
        assert_eq!(flashes[0].message, "Topic not found");
        assert_eq!(commit(&db, &cfg(), &second, now).await.unwrap(), None);

        let third = Session::from_state(load(&db, &cfg(), &headers_with(&pair), now).await);
        assert!(third.take_flashes().is_empty());
    }

    #[tokio::test]
    async fn login_rotates_the_token_and_logout_clears_it() {
        let db = SqliteTrackerDb::in_memory().await.unwrap();
        let user = db
            .create_user(&NewUser {
                email: "a@example.com".into(),
                username: "a".into(),
                password_hash: Some("h".into()),
                google_id: None,
            })
            .await
            .unwrap();
        let now = Utc::now();

        let anon = Session::from_state(load(&db, &cfg(), &HeaderMap::new(), now).await);
        anon.flash(FlashKind::Error, "You must login to continue");
        let anon_pair = cookie_pair(&commit(&db, &cfg(), &anon, now).await.unwrap().unwrap());

        let s = Session::from_state(load(&db, &cfg(), &headers_with(&anon_pair), now).await);
        s.login(user.id);
        let user_pair = cookie_pair(&commit(&db, &cfg(), &s, now).await.unwrap().unwrap());
        assert_ne!(anon_pair, user_pair);

        let old = load(&db, &cfg(), &headers_with(&anon_pair), now).await;
        assert_eq!(old.user_id, None);
        let fresh = load(&db, &cfg(), &headers_with(&user_pair), now).await;
        assert_eq!(fresh.user_id, Some(user.id));

        let out = Session::from_state(fresh);
        out.logout();
        let cleared = commit(&db, &cfg(), &out, now).await.unwrap().unwrap();
        assert!(cleared.starts_with("kt.sid=;"));
        assert!(cleared.contains("Max-Age=0"));
        let gone = load(&db, &cfg(), &headers_with(&user_pair), now).await;
        assert_eq!(gone.user_id, None);
    }

    #[tokio::test]
    async fn expired_rows_are_anonymous_and_removed() {
        let db = SqliteTrackerDb::in_memory().await.unwrap();
        let now = Utc::now();
        let s = Session::from_state(load(&db, &cfg(), &HeaderMap::new(), now).await);
        s.flash(FlashKind::Success, "hi");
        let pair = cookie_pair(&commit(&db, &cfg(), &s, now).await.unwrap().unwrap());

        let later = now + chrono::Duration::hours(2);
        let state = load(&db, &cfg(), &headers_with(&pair), later).await;
        assert!(state.loaded.is_none());
        let session = Session::from_state(state);
        assert!(session.take_flashes().is_empty());
        commit(&db, &cfg(), &session, later).await.unwrap();

        let token = verify_token("test-secret", pair.trim_start_matches("kt.sid=")).unwrap();
        assert!(db.get_session(&sha256_hex(token.as_bytes())).await.unwrap().is_none());
    }
}
