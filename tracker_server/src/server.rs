use crate::{routes, session};
use axum::{Extension, Router, middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracker_core::{IdentityProvider, SearchProvider, TrackerConfig, TrackerDb};
use tracker_integrations::search::http_client;
use tracker_integrations::{
    DuckDuckGoSearch, GoogleIdentityProvider, WikipediaSearch, YoutubeSearch,
};

const SESSION_PRUNE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn TrackerDb>,
    pub youtube: Arc<dyn SearchProvider>,
    pub duck: Arc<dyn SearchProvider>,
    pub wiki: Arc<dyn SearchProvider>,
    /// Google sign-in; `None` when the OAuth env vars are not set.
    pub identity: Option<Arc<dyn IdentityProvider>>,
    pub config: TrackerConfig,
    pub started_at: Instant,
}

impl AppState {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(
        db: Arc<dyn TrackerDb>,
        youtube: Arc<dyn SearchProvider>,
        duck: Arc<dyn SearchProvider>,
        wiki: Arc<dyn SearchProvider>,
        identity: Option<Arc<dyn IdentityProvider>>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            db,
            youtube,
            duck,
            wiki,
            identity,
            config,
            started_at: Instant::now(),
        }
    }

    /// Connect the configured database and build the real HTTP integrations.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn from_config(config: TrackerConfig) -> anyhow::Result<Self> {
        let db = tracker_core::store::connect(&config.database).await?;
        let client = http_client(config.search.http_timeout)?;

        let youtube = Arc::new(YoutubeSearch::new(
            client.clone(),
            config.search.youtube_api_key.clone(),
        ));
        if config.search.youtube_api_key.is_none() {
            tracing::warn!("YOUTUBE_API_KEY not set; /api/youtube will return 500");
        }
        let identity: Option<Arc<dyn IdentityProvider>> = match &config.google {
            Some(google) => Some(Arc::new(GoogleIdentityProvider::new(
                client.clone(),
                google.clone(),
            ))),
            None => {
                tracing::info!("google sign-in disabled (GOOGLE_CLIENT_ID not set)");
                None
            }
        };

        Ok(Self::new(
            db,
            youtube,
            Arc::new(DuckDuckGoSearch::new(client.clone())),
            Arc::new(WikipediaSearch::new(client)),
            identity,
            config,
        ))
    }
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .merge(routes::router())
        .fallback(routes::index::not_found)
        .layer(middleware::from_fn(session::session_middleware))
        .layer(Extension(state))
        .layer(SetRequestIdLayer::new(
            axum::http::HeaderName::from_static("x-request-id"),
            MakeRequestUuid,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Periodically delete expired session rows.
pub fn spawn_session_pruner(
    db: Arc<dyn TrackerDb>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match db.delete_expired_sessions(chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(removed = n, "pruned expired sessions"),
                Err(e) => tracing::warn!(error = %e, "session prune failed"),
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[tracing::instrument(level = "info", skip_all, fields(%addr))]
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    if state.config.uses_default_session_secret() {
        tracing::warn!("running with the development SESSION_SECRET; set one in production");
    }
    let pruner = spawn_session_pruner(state.db.clone(), SESSION_PRUNE_INTERVAL);

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("knowledge tracker listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pruner.abort();
    Ok(())
}
