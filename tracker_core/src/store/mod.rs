pub mod postgres;
pub mod sqlite;
pub mod traits;

pub use postgres::PostgresTrackerDb;
pub use sqlite::SqliteTrackerDb;
pub use traits::TrackerDb;

use crate::Result;
use crate::config::DatabaseConfig;
use std::sync::Arc;

/// Open the configured backend and make sure its schema exists.
#[tracing::instrument(level = "info", skip_all)]
pub async fn connect(cfg: &DatabaseConfig) -> Result<Arc<dyn TrackerDb>> {
    match cfg {
        DatabaseConfig::Postgres(pg) => {
            let db = PostgresTrackerDb::connect(pg).await?;
            db.migrate().await?;
            tracing::info!("connected to postgres");
            Ok(Arc::new(db))
        }
        DatabaseConfig::Sqlite { path } => {
            let db = SqliteTrackerDb::new(path).await?;
            tracing::info!(path = %path.display(), "opened sqlite database");
            Ok(Arc::new(db))
        }
    }
}
