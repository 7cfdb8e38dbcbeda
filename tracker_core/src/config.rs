use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SESSION_SECRET: &str = "jus-sth";

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub enum DatabaseConfig {
    Postgres(PostgresConfig),
    /// Local single-file SQLite database under the dev data directory.
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl: Duration,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub youtube_api_key: Option<String>,
    pub http_timeout: Duration,
}

/// Whole-application configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub google: Option<GoogleOAuthConfig>,
    pub search: SearchConfig,
}

impl TrackerConfig {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn from_env(data_dir: PathBuf) -> Result<Self> {
        Self::from_lookup(data_dir, |k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup (the process env in production).
    pub fn from_lookup(data_dir: PathBuf, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |k: &str| var(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database = match non_empty("DATABASE_URL") {
            Some(url) => DatabaseConfig::Postgres(PostgresConfig {
                url,
                max_connections: non_empty("TRACKER_DB_MAX_CONNECTIONS")
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(10),
                acquire_timeout: Duration::from_millis(
                    non_empty("TRACKER_DB_ACQUIRE_TIMEOUT_MS")
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(5_000),
                ),
            }),
            None => DatabaseConfig::Sqlite {
                path: data_dir.join("tracker.db"),
            },
        };

        let secret =
            non_empty("SESSION_SECRET").unwrap_or_else(|| DEFAULT_SESSION_SECRET.to_string());
        let ttl_days = non_empty("TRACKER_SESSION_TTL_DAYS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(15);
        let cookie_secure = non_empty("TRACKER_COOKIE_SECURE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let google = match (
            non_empty("GOOGLE_CLIENT_ID"),
            non_empty("GOOGLE_CLIENT_SECRET"),
            non_empty("GOOGLE_CALLBACK_URL"),
        ) {
            (Some(client_id), Some(client_secret), Some(callback_url)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret,
                callback_url,
            }),
            (None, None, None) => None,
            _ => {
                return Err(Error::InvalidInput(
                    "GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET and GOOGLE_CALLBACK_URL must be set together"
                        .to_string(),
                ));
            }
        };

        let cfg = Self {
            database,
            session: SessionConfig {
                secret,
                ttl: Duration::from_secs(ttl_days * 24 * 60 * 60),
                cookie_secure,
            },
            google,
            search: SearchConfig {
                youtube_api_key: non_empty("YOUTUBE_API_KEY"),
                http_timeout: Duration::from_millis(
                    non_empty("TRACKER_HTTP_TIMEOUT_MS")
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(20_000),
                ),
            },
        };

        cfg.validate()?;
        Ok(cfg)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn validate(&self) -> Result<()> {
        if let DatabaseConfig::Postgres(pg) = &self.database {
            if pg.max_connections == 0 {
                return Err(Error::InvalidInput(
                    "postgres.max_connections must be > 0".to_string(),
                ));
            }
            if pg.acquire_timeout.is_zero() {
                return Err(Error::InvalidInput(
                    "postgres.acquire_timeout must be > 0".to_string(),
                ));
            }
        }
        if self.session.secret.len() < 4 {
            return Err(Error::InvalidInput("session.secret is too short".to_string()));
        }
        if self.session.ttl.is_zero() {
            return Err(Error::InvalidInput("session.ttl must be > 0".to_string()));
        }
        if self.search.http_timeout.is_zero() {
            return Err(Error::InvalidInput(
                "search.http_timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn uses_default_session_secret(&self) -> bool {
        self.session.secret == DEFAULT_SESSION_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_to_sqlite_and_dev_secret() {
        let cfg = TrackerConfig::from_lookup(PathBuf::from("/tmp/kt"), lookup(&[])).unwrap();
        match &cfg.database {
            DatabaseConfig::Sqlite { path } => assert_eq!(path, &PathBuf::from("/tmp/kt/tracker.db")),
            other => panic!("unexpected database config: {other:?}"),
        }
        assert!(cfg.uses_default_session_secret());
        assert_eq!(cfg.session.ttl, Duration::from_secs(15 * 24 * 60 * 60));
        assert!(cfg.google.is_none());
        assert!(cfg.search.youtube_api_key.is_none());
    }

    #[test]
    fn postgres_settings_are_read() {
        let cfg = TrackerConfig::from_lookup(
            PathBuf::from("."),
            lookup(&[
                ("DATABASE_URL", "postgres://u:p@localhost/kt"),
                ("TRACKER_DB_MAX_CONNECTIONS", "3"),
                ("SESSION_SECRET", "s3cret-value"),
            ]),
        )
        .unwrap();
        let DatabaseConfig::Postgres(ref pg) = cfg.database else {
            panic!("expected postgres");
        };
        assert_eq!(pg.max_connections, 3);
        assert_eq!(pg.acquire_timeout, Duration::from_millis(5_000));
        assert!(!cfg.uses_default_session_secret());
    }

    #[test]
    fn partial_google_config_is_rejected() {
        let err = TrackerConfig::from_lookup(
            PathBuf::from("."),
            lookup(&[("GOOGLE_CLIENT_ID", "abc")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn zero_pool_size_fails_validation() {
        let err = TrackerConfig::from_lookup(
            PathBuf::from("."),
            lookup(&[
                ("DATABASE_URL", "postgres://localhost/kt"),
                ("TRACKER_DB_MAX_CONNECTIONS", "0"),
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_connections"));
    }
}
