use clap::Parser;
use std::net::SocketAddr;
use tracker_core::config::DatabaseConfig;
use tracker_core::{PostgresConfig, PostgresTrackerDb, SqliteTrackerDb, TrackerConfig};
use tracker_server::cli::{Cli, Commands, redact};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real deployments set the env directly.
    let _ = dotenvy::dotenv();
    tracker_core::o11y::init_global_from_env()?;
    let cli = Cli::parse();

    let cmd = cli.into_command()?;

    match cmd {
        Commands::Serve {
            host,
            port,
            data_dir,
        } => {
            let addr: SocketAddr = format!("{host}:{port}").parse()?;
            let config = TrackerConfig::from_env(data_dir)?;
            let state = tracker_server::server::AppState::from_config(config).await?;
            tracker_server::server::serve(addr, state).await?;
        }
        Commands::Migrate {
            database_url,
            data_dir,
        } => {
            let mut config = TrackerConfig::from_env(data_dir)?;
            if let Some(url) = database_url {
                config.database = DatabaseConfig::Postgres(PostgresConfig {
                    url,
                    max_connections: 2,
                    acquire_timeout: std::time::Duration::from_secs(10),
                });
            }
            match &config.database {
                DatabaseConfig::Postgres(pg) => {
                    PostgresTrackerDb::connect(pg).await?.migrate().await?;
                    tracing::info!("postgres migrations applied");
                }
                DatabaseConfig::Sqlite { path } => {
                    // Opening the SQLite store applies its schema.
                    SqliteTrackerDb::new(path).await?;
                    tracing::info!(path = %path.display(), "sqlite schema applied");
                }
            }
        }
        Commands::Config { data_dir } => {
            let config = TrackerConfig::from_env(data_dir)?;
            let database = match &config.database {
                DatabaseConfig::Postgres(pg) => serde_json::json!({
                    "kind": "postgres",
                    "url": redact(&pg.url),
                    "max_connections": pg.max_connections,
                }),
                DatabaseConfig::Sqlite { path } => serde_json::json!({
                    "kind": "sqlite",
                    "path": path.display().to_string(),
                }),
            };
            let cfg = serde_json::json!({
                "database": database,
                "session": {
                    "secret": redact(&config.session.secret),
                    "default_secret": config.uses_default_session_secret(),
                    "ttl_secs": config.session.ttl.as_secs(),
                    "cookie_secure": config.session.cookie_secure,
                },
                "google": config.google.as_ref().map(|g| serde_json::json!({
                    "client_id": g.client_id,
                    "client_secret": redact(&g.client_secret),
                    "callback_url": g.callback_url,
                })),
                "youtube_api_key": config.search.youtube_api_key.as_deref().map(redact),
                "http_timeout_ms": config.search.http_timeout.as_millis() as u64,
            });
            println!("{}", serde_json::to_string_pretty(&cfg)?);
        }
        Commands::Check { data_dir } => {
            let config = TrackerConfig::from_env(data_dir)?;
            let kind = match &config.database {
                DatabaseConfig::Postgres(_) => "postgres",
                DatabaseConfig::Sqlite { .. } => "sqlite",
            };
            match tracker_core::store::connect(&config.database).await {
                Ok(db) => match db.ping().await {
                    Ok(()) => println!("{kind}: ok"),
                    Err(e) => println!("{kind}: error ({e})"),
                },
                Err(e) => println!("{kind}: error ({e})"),
            }
            println!(
                "google sign-in: {}",
                if config.google.is_some() {
                    "configured"
                } else {
                    "not configured"
                }
            );
            println!(
                "youtube: {}",
                if config.search.youtube_api_key.is_some() {
                    "configured"
                } else {
                    "not configured"
                }
            );
        }
    }

    Ok(())
}
