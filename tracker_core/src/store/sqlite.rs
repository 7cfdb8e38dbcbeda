//! SQLite-backed `TrackerDb`.
//!
//! Used for local development (a single WAL-mode file under the data dir) and
//! for tests (`in_memory`). Timestamps are stored as fixed-width RFC 3339 text
//! so lexical order matches chronological order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use crate::models::{
    CascadeReport, NewResource, NewStudyLog, NewStudyLogResource, NewTopic, NewUser,
    ResourceId, ResourceRecord, SessionData, SessionRecord, StudyLogId, StudyLogRecord,
    StudyLogResourceId, StudyLogResourceRecord, StudyLogSummary, TopicId, TopicRecord, UserId,
    UserRecord,
};
use crate::store::traits::TrackerDb;
use crate::{Error, Result};

#[derive(Clone)]
pub struct SqliteTrackerDb {
    pool: SqlitePool,
}

impl SqliteTrackerDb {
    /// Open (or create) the database file, creating parent directories, and
    /// apply the schema.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::backend("sqlite_tracker_db", e))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", path.display()))
            .map_err(|e| Error::backend("sqlite_tracker_db", e))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(|e| Error::backend("sqlite_tracker_db", e))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// A private in-memory database. The pool holds exactly one connection
    /// that never expires, since every new connection would see an empty db.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| Error::backend("sqlite_tracker_db", e))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(|e| Error::backend("sqlite_tracker_db", e))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::backend("sqlite_tracker_db_migration", e))?;
        Ok(())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL,
    password_hash TEXT,
    google_id TEXT UNIQUE,
    created_at TEXT NOT NULL,
    CHECK (password_hash IS NOT NULL OR google_id IS NOT NULL)
);

CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    title TEXT NOT NULL,
    slug TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS topics_user_idx ON topics(user_id, created_at);

CREATE TABLE IF NOT EXISTS study_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    topic_id INTEGER NOT NULL REFERENCES topics(id),
    duration_in_minutes INTEGER NOT NULL DEFAULT 0,
    notes TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS study_logs_user_idx ON study_logs(user_id, created_at);
CREATE INDEX IF NOT EXISTS study_logs_topic_idx ON study_logs(topic_id);

CREATE TABLE IF NOT EXISTS resources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_id INTEGER NOT NULL REFERENCES topics(id),
    source TEXT,
    title TEXT,
    url TEXT,
    snippet TEXT,
    extra TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS resources_topic_idx ON resources(topic_id);

CREATE TABLE IF NOT EXISTS study_log_resources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    study_log_id INTEGER NOT NULL REFERENCES study_logs(id),
    title TEXT NOT NULL,
    snippet TEXT,
    source TEXT,
    url TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS study_log_resources_log_idx ON study_log_resources(study_log_id);

CREATE TABLE IF NOT EXISTS sessions (
    token_hash TEXT PRIMARY KEY,
    user_id INTEGER REFERENCES users(id),
    data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS sessions_expires_idx ON sessions(expires_at);
"#;

fn db_err(e: sqlx::Error) -> Error {
    Error::backend("sqlite", e)
}

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::backend("sqlite timestamp", e))
}

fn get<'r, T>(row: &'r SqliteRow, col: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(col).map_err(db_err)
}

fn row_to_user(row: &SqliteRow) -> Result<UserRecord> {
    Ok(UserRecord {
        id: UserId(get(row, "id")?),
        email: get(row, "email")?,
        username: get(row, "username")?,
        password_hash: get(row, "password_hash")?,
        google_id: get(row, "google_id")?,
        created_at: parse_dt(&get::<String>(row, "created_at")?)?,
    })
}

fn row_to_topic(row: &SqliteRow) -> Result<TopicRecord> {
    Ok(TopicRecord {
        id: TopicId(get(row, "id")?),
        user_id: UserId(get(row, "user_id")?),
        title: get(row, "title")?,
        slug: get(row, "slug")?,
        description: get(row, "description")?,
        created_at: parse_dt(&get::<String>(row, "created_at")?)?,
    })
}

fn row_to_log(row: &SqliteRow) -> Result<StudyLogRecord> {
    Ok(StudyLogRecord {
        id: StudyLogId(get(row, "id")?),
        user_id: UserId(get(row, "user_id")?),
        topic_id: TopicId(get(row, "topic_id")?),
        duration_in_minutes: get(row, "duration_in_minutes")?,
        notes: get(row, "notes")?,
        created_at: parse_dt(&get::<String>(row, "created_at")?)?,
    })
}

fn row_to_resource(row: &SqliteRow) -> Result<ResourceRecord> {
    let extra = get::<Option<String>>(row, "extra")?
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| Error::backend("resource extra", e))?;
    Ok(ResourceRecord {
        id: ResourceId(get(row, "id")?),
        topic_id: TopicId(get(row, "topic_id")?),
        source: get(row, "source")?,
        title: get(row, "title")?,
        url: get(row, "url")?,
        snippet: get(row, "snippet")?,
        extra,
        created_at: parse_dt(&get::<String>(row, "created_at")?)?,
    })
}

fn row_to_log_resource(row: &SqliteRow) -> Result<StudyLogResourceRecord> {
    Ok(StudyLogResourceRecord {
        id: StudyLogResourceId(get(row, "id")?),
        study_log_id: StudyLogId(get(row, "study_log_id")?),
        title: get(row, "title")?,
        snippet: get(row, "snippet")?,
        source: get(row, "source")?,
        url: get(row, "url")?,
        created_at: parse_dt(&get::<String>(row, "created_at")?)?,
    })
}

fn row_to_session(row: &SqliteRow) -> Result<SessionRecord> {
    let data: SessionData = serde_json::from_str(&get::<String>(row, "data")?)
        .map_err(|e| Error::backend("session data", e))?;
    Ok(SessionRecord {
        token_hash: get(row, "token_hash")?,
        user_id: get::<Option<i64>>(row, "user_id")?.map(UserId),
        data,
        created_at: parse_dt(&get::<String>(row, "created_at")?)?,
        expires_at: parse_dt(&get::<String>(row, "expires_at")?)?,
    })
}

fn session_json(data: &SessionData) -> Result<String> {
    serde_json::to_string(data).map_err(|e| Error::backend("session data", e))
}

// ── TrackerDb impl ─────────────────────────────────────────────

#[async_trait]
impl TrackerDb for SqliteTrackerDb {
    #[tracing::instrument(level = "debug", skip(self, user), fields(email = %user.email))]
    async fn create_user(&self, user: &NewUser) -> Result<UserRecord> {
        if user.password_hash.is_none() && user.google_id.is_none() {
            return Err(Error::InvalidInput(
                "user needs a password or a google account".to_string(),
            ));
        }
        let res = sqlx::query(
            "INSERT INTO users (email, username, password_hash, google_id, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.google_id)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("insert user", e))?;

        let id = UserId(res.last_insert_rowid());
        self.get_user(id)
            .await?
            .ok_or_else(|| Error::BackendMessage(format!("user {id} vanished after insert")))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_user).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, email))]
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_user).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, email))]
    async fn find_user_for_google(
        &self,
        google_id: &str,
        email: Option<&str>,
    ) -> Result<Option<UserRecord>> {
        let row = sqlx::query(
            "SELECT * FROM users
             WHERE google_id = ?1 OR (?2 IS NOT NULL AND email = ?2)
             ORDER BY CASE WHEN google_id = ?1 THEN 0 ELSE 1 END, id
             LIMIT 1",
        )
        .bind(google_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(row_to_user).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, google_id))]
    async fn link_google_id(&self, user_id: UserId, google_id: &str) -> Result<()> {
        sqlx::query("UPDATE users SET google_id = ? WHERE id = ?")
            .bind(google_id)
            .bind(user_id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::from_sqlx("link google id", e))?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, topic), fields(user_id = %topic.user_id))]
    async fn create_topic(&self, topic: &NewTopic) -> Result<TopicRecord> {
        let res = sqlx::query(
            "INSERT INTO topics (user_id, title, slug, description, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(topic.user_id.0)
        .bind(&topic.title)
        .bind(&topic.slug)
        .bind(&topic.description)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("insert topic", e))?;

        let id = TopicId(res.last_insert_rowid());
        self.get_topic(topic.user_id, id)
            .await?
            .ok_or_else(|| Error::BackendMessage(format!("topic {id} vanished after insert")))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_topic(&self, user_id: UserId, topic_id: TopicId) -> Result<Option<TopicRecord>> {
        let row = sqlx::query("SELECT * FROM topics WHERE id = ? AND user_id = ?")
            .bind(topic_id.0)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_topic).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_topics(&self, user_id: UserId) -> Result<Vec<TopicRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM topics WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_topic).collect()
    }

    #[tracing::instrument(level = "info", skip(self))]
    async fn delete_topic_cascade(
        &self,
        user_id: UserId,
        topic_id: TopicId,
    ) -> Result<CascadeReport> {
        if self.get_topic(user_id, topic_id).await?.is_none() {
            return Err(Error::NotFound(format!("topic {topic_id}")));
        }

        let mut report = CascadeReport::default();
        report.study_log_resources = sqlx::query(
            "DELETE FROM study_log_resources WHERE study_log_id IN (
               SELECT id FROM study_logs WHERE topic_id = ? AND user_id = ?
             )",
        )
        .bind(topic_id.0)
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        report.study_logs = sqlx::query("DELETE FROM study_logs WHERE topic_id = ? AND user_id = ?")
            .bind(topic_id.0)
            .bind(user_id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();

        report.resources = sqlx::query("DELETE FROM resources WHERE topic_id = ?")
            .bind(topic_id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();

        report.topics = sqlx::query("DELETE FROM topics WHERE id = ? AND user_id = ?")
            .bind(topic_id.0)
            .bind(user_id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();

        Ok(report)
    }

    #[tracing::instrument(level = "debug", skip(self, log), fields(topic_id = %log.topic_id))]
    async fn create_study_log(&self, log: &NewStudyLog) -> Result<StudyLogRecord> {
        let res = sqlx::query(
            "INSERT INTO study_logs (user_id, topic_id, duration_in_minutes, notes, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(log.user_id.0)
        .bind(log.topic_id.0)
        .bind(log.duration_in_minutes)
        .bind(&log.notes)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("insert study log", e))?;

        let id = StudyLogId(res.last_insert_rowid());
        self.get_study_log(log.user_id, id)
            .await?
            .ok_or_else(|| Error::BackendMessage(format!("study log {id} vanished after insert")))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_study_log(
        &self,
        user_id: UserId,
        log_id: StudyLogId,
    ) -> Result<Option<StudyLogRecord>> {
        let row = sqlx::query("SELECT * FROM study_logs WHERE id = ? AND user_id = ?")
            .bind(log_id.0)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_log).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_topic_study_logs(
        &self,
        user_id: UserId,
        topic_id: TopicId,
    ) -> Result<Vec<StudyLogRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM study_logs WHERE topic_id = ? AND user_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(topic_id.0)
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_log).collect()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_recent_study_logs(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<StudyLogSummary>> {
        let rows = sqlx::query(
            "SELECT sl.id, sl.user_id, sl.topic_id, sl.duration_in_minutes, sl.notes,
                    sl.created_at, t.title AS topic_title
             FROM study_logs sl
             LEFT JOIN topics t ON sl.topic_id = t.id
             WHERE sl.user_id = ?
             ORDER BY sl.created_at DESC, sl.id DESC
             LIMIT ?",
        )
        .bind(user_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok(StudyLogSummary {
                    log: row_to_log(row)?,
                    topic_title: get(row, "topic_title")?,
                })
            })
            .collect()
    }

    #[tracing::instrument(level = "info", skip(self))]
    async fn delete_study_log_cascade(
        &self,
        user_id: UserId,
        log_id: StudyLogId,
    ) -> Result<CascadeReport> {
        if self.get_study_log(user_id, log_id).await?.is_none() {
            return Err(Error::NotFound(format!("study log {log_id}")));
        }

        let mut report = CascadeReport::default();
        report.study_log_resources =
            sqlx::query("DELETE FROM study_log_resources WHERE study_log_id = ?")
                .bind(log_id.0)
                .execute(&self.pool)
                .await
                .map_err(db_err)?
                .rows_affected();

        report.study_logs = sqlx::query("DELETE FROM study_logs WHERE id = ? AND user_id = ?")
            .bind(log_id.0)
            .bind(user_id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();

        Ok(report)
    }

    #[tracing::instrument(level = "debug", skip(self, resource), fields(topic_id = %resource.topic_id))]
    async fn add_resource(&self, resource: &NewResource) -> Result<ResourceRecord> {
        let extra = resource
            .extra
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::backend("resource extra", e))?;
        let res = sqlx::query(
            "INSERT INTO resources (topic_id, source, title, url, snippet, extra, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(resource.topic_id.0)
        .bind(&resource.source)
        .bind(&resource.title)
        .bind(&resource.url)
        .bind(&resource.snippet)
        .bind(extra)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("insert resource", e))?;

        let row = sqlx::query("SELECT * FROM resources WHERE id = ?")
            .bind(res.last_insert_rowid())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        row_to_resource(&row)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_topic_resources(&self, topic_id: TopicId) -> Result<Vec<ResourceRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM resources WHERE topic_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(topic_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_resource).collect()
    }

    #[tracing::instrument(level = "debug", skip(self, resource), fields(study_log_id = %resource.study_log_id))]
    async fn add_study_log_resource(
        &self,
        resource: &NewStudyLogResource,
    ) -> Result<StudyLogResourceRecord> {
        let res = sqlx::query(
            "INSERT INTO study_log_resources (study_log_id, title, snippet, source, url, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(resource.study_log_id.0)
        .bind(&resource.title)
        .bind(&resource.snippet)
        .bind(&resource.source)
        .bind(&resource.url)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("insert study log resource", e))?;

        let row = sqlx::query("SELECT * FROM study_log_resources WHERE id = ?")
            .bind(res.last_insert_rowid())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        row_to_log_resource(&row)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_study_log_resources(
        &self,
        log_id: StudyLogId,
    ) -> Result<Vec<StudyLogResourceRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM study_log_resources WHERE study_log_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(log_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_log_resource).collect()
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn insert_session(&self, session: &SessionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, data, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.token_hash)
        .bind(session.user_id.map(|u| u.0))
        .bind(session_json(&session.data)?)
        .bind(ts(session.created_at))
        .bind(ts(session.expires_at))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("insert session", e))?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn get_session(&self, token_hash: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_session).transpose()
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn update_session(&self, session: &SessionRecord) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET user_id = ?, data = ?, expires_at = ? WHERE token_hash = ?",
        )
        .bind(session.user_id.map(|u| u.0))
        .bind(session_json(&session.data)?)
        .bind(ts(session.expires_at))
        .bind(&session.token_hash)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn delete_session(&self, token_hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let res = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(ts(now))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Flash, FlashKind};
    use chrono::Duration;

    async fn db() -> SqliteTrackerDb {
        SqliteTrackerDb::in_memory().await.unwrap()
    }

    async fn user(db: &SqliteTrackerDb, email: &str) -> UserRecord {
        db.create_user(&NewUser {
            email: email.to_string(),
            username: email.to_string(),
            password_hash: Some("$argon2id$stub".to_string()),
            google_id: None,
        })
        .await
        .unwrap()
    }

    async fn topic(db: &SqliteTrackerDb, owner: UserId, title: &str) -> TopicRecord {
        db.create_topic(&NewTopic {
            user_id: owner,
            title: title.to_string(),
            slug: title.to_lowercase(),
            description: None,
        })
        .await
        .unwrap()
    }

    async fn log(db: &SqliteTrackerDb, owner: UserId, topic_id: TopicId, minutes: i64) -> StudyLogRecord {
        db.create_study_log(&NewStudyLog {
            user_id: owner,
            topic_id,
            duration_in_minutes: minutes,
            notes: Some("read chapter".to_string()),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let db = db().await;
        user(&db, "a@example.com").await;
        let err = db
            .create_user(&NewUser {
                email: "a@example.com".into(),
                username: "again".into(),
                password_hash: Some("x".into()),
                google_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn user_without_credentials_is_rejected() {
        let db = db().await;
        let err = db
            .create_user(&NewUser {
                email: "nobody@example.com".into(),
                username: "nobody".into(),
                password_hash: None,
                google_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn topics_are_scoped_to_their_owner() {
        let db = db().await;
        let alice = user(&db, "alice@example.com").await;
        let bob = user(&db, "bob@example.com").await;
        let t = topic(&db, alice.id, "Rust").await;

        assert!(db.get_topic(alice.id, t.id).await.unwrap().is_some());
        assert!(db.get_topic(bob.id, t.id).await.unwrap().is_none());
        assert!(db.list_topics(bob.id).await.unwrap().is_empty());

        let err = db.delete_topic_cascade(bob.id, t.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(db.get_topic(alice.id, t.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn lists_are_newest_first() {
        let db = db().await;
        let alice = user(&db, "alice@example.com").await;
        let first = topic(&db, alice.id, "First").await;
        let second = topic(&db, alice.id, "Second").await;

        let ids: Vec<TopicId> = db
            .list_topics(alice.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn topic_cascade_removes_everything_below_it() {
        let db = db().await;
        let alice = user(&db, "alice@example.com").await;
        let t = topic(&db, alice.id, "Databases").await;
        let other = topic(&db, alice.id, "Networks").await;
        let l1 = log(&db, alice.id, t.id, 30).await;
        let l2 = log(&db, alice.id, t.id, 45).await;
        let kept = log(&db, alice.id, other.id, 10).await;

        for l in [l1.id, l2.id, kept.id] {
            db.add_study_log_resource(&NewStudyLogResource {
                study_log_id: l,
                title: "B-trees".into(),
                snippet: None,
                source: Some("wikipedia".into()),
                url: "https://en.wikipedia.org/wiki/B-tree".into(),
            })
            .await
            .unwrap();
        }
        db.add_resource(&NewResource {
            topic_id: t.id,
            source: Some("Youtube".into()),
            title: Some("Indexes".into()),
            url: Some("https://www.youtube.com/watch?v=abc".into()),
            snippet: None,
            extra: Some(serde_json::json!({"channelTitle": "cmu"})),
        })
        .await
        .unwrap();

        let report = db.delete_topic_cascade(alice.id, t.id).await.unwrap();
        assert_eq!(
            report,
            CascadeReport {
                study_log_resources: 2,
                study_logs: 2,
                resources: 1,
                topics: 1,
            }
        );
        assert!(db.get_topic(alice.id, t.id).await.unwrap().is_none());
        assert!(db.list_topic_resources(t.id).await.unwrap().is_empty());
        assert!(db.list_study_log_resources(l1.id).await.unwrap().is_empty());
        assert_eq!(db.list_study_log_resources(kept.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn study_log_cascade_is_owner_scoped() {
        let db = db().await;
        let alice = user(&db, "alice@example.com").await;
        let bob = user(&db, "bob@example.com").await;
        let t = topic(&db, alice.id, "Rust").await;
        let l = log(&db, alice.id, t.id, 25).await;

        assert!(db.get_study_log(bob.id, l.id).await.unwrap().is_none());
        assert!(db.delete_study_log_cascade(bob.id, l.id).await.is_err());

        let report = db.delete_study_log_cascade(alice.id, l.id).await.unwrap();
        assert_eq!(report.study_logs, 1);
        assert!(db.get_study_log(alice.id, l.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_logs_carry_topic_titles() {
        let db = db().await;
        let alice = user(&db, "alice@example.com").await;
        let t = topic(&db, alice.id, "Algebra").await;
        for minutes in 0..3 {
            log(&db, alice.id, t.id, minutes).await;
        }

        let recent = db.list_recent_study_logs(alice.id, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].log.duration_in_minutes, 2);
        assert_eq!(recent[0].topic_title.as_deref(), Some("Algebra"));
    }

    #[tokio::test]
    async fn resource_extra_survives_storage() {
        let db = db().await;
        let alice = user(&db, "alice@example.com").await;
        let t = topic(&db, alice.id, "Music").await;
        let extra = serde_json::json!({"thumbnail": "https://i.ytimg.com/x.jpg"});
        db.add_resource(&NewResource {
            topic_id: t.id,
            source: Some("Youtube".into()),
            title: Some("Scales".into()),
            url: None,
            snippet: Some("".into()),
            extra: Some(extra.clone()),
        })
        .await
        .unwrap();

        let stored = db.list_topic_resources(t.id).await.unwrap();
        assert_eq!(stored[0].extra.as_ref(), Some(&extra));
        assert_eq!(stored[0].url, None);
    }

    #[tokio::test]
    async fn google_lookup_prefers_id_then_email() {
        let db = db().await;
        let alice = user(&db, "alice@example.com").await;

        let by_email = db
            .find_user_for_google("g-123", Some("alice@example.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, alice.id);
        assert!(by_email.google_id.is_none());

        db.link_google_id(alice.id, "g-123").await.unwrap();
        let by_id = db.find_user_for_google("g-123", None).await.unwrap().unwrap();
        assert_eq!(by_id.id, alice.id);
        assert_eq!(by_id.google_id.as_deref(), Some("g-123"));

        assert!(db.find_user_for_google("g-999", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sessions_round_trip_and_expire() {
        let db = db().await;
        let alice = user(&db, "alice@example.com").await;
        let now = Utc::now();

        let mut live = SessionRecord {
            token_hash: "live".into(),
            user_id: None,
            data: SessionData::default(),
            created_at: now,
            expires_at: now + Duration::days(1),
        };
        db.insert_session(&live).await.unwrap();
        db.insert_session(&SessionRecord {
            token_hash: "stale".into(),
            user_id: None,
            data: SessionData::default(),
            created_at: now - Duration::days(3),
            expires_at: now - Duration::days(1),
        })
        .await
        .unwrap();

        live.user_id = Some(alice.id);
        live.data.flashes.push(Flash {
            kind: FlashKind::Success,
            message: "hi".into(),
        });
        db.update_session(&live).await.unwrap();

        let loaded = db.get_session("live").await.unwrap().unwrap();
        assert_eq!(loaded.user_id, Some(alice.id));
        assert_eq!(loaded.data.flashes.len(), 1);

        assert_eq!(db.delete_expired_sessions(now).await.unwrap(), 1);
        assert!(db.get_session("stale").await.unwrap().is_none());

        db.delete_session("live").await.unwrap();
        assert!(db.get_session("live").await.unwrap().is_none());
    }
}
