use crate::config::PostgresConfig;
use crate::models::{
    CascadeReport, NewResource, NewStudyLog, NewStudyLogResource, NewTopic, NewUser,
    ResourceRecord, SessionData, SessionRecord, StudyLogId, StudyLogRecord,
    StudyLogResourceRecord, StudyLogSummary, TopicId, TopicRecord, UserId, UserRecord,
};
use crate::store::traits::TrackerDb;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};

const MIGRATION_0001: &str = include_str!("../../migrations/0001_init.sql");

const USER_COLUMNS: &str = "id, email, username, password_hash, google_id, created_at";
const TOPIC_COLUMNS: &str = "id, user_id, title, slug, description, created_at";
const LOG_COLUMNS: &str = "id, user_id, topic_id, duration_in_minutes, notes, created_at";
const RESOURCE_COLUMNS: &str = "id, topic_id, source, title, url, snippet, extra, created_at";
const LOG_RESOURCE_COLUMNS: &str = "id, study_log_id, title, snippet, source, url, created_at";

#[derive(Clone)]
pub struct PostgresTrackerDb {
    pool: PgPool,
}

impl PostgresTrackerDb {
    #[tracing::instrument(level = "debug", skip(cfg))]
    pub async fn connect(cfg: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(cfg.acquire_timeout)
            .connect(&cfg.url)
            .await
            .map_err(|e| Error::backend("connect postgres", e))?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the schema. Idempotent.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATION_0001)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::backend("apply migrations", e))?;
        Ok(())
    }

    fn user_from_row(row: &PgRow) -> Result<UserRecord> {
        Ok(UserRecord {
            id: row.try_get("id").map_err(|e| Error::backend("id", e))?,
            email: row
                .try_get("email")
                .map_err(|e| Error::backend("email", e))?,
            username: row
                .try_get("username")
                .map_err(|e| Error::backend("username", e))?,
            password_hash: row
                .try_get("password_hash")
                .map_err(|e| Error::backend("password_hash", e))?,
            google_id: row
                .try_get("google_id")
                .map_err(|e| Error::backend("google_id", e))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| Error::backend("created_at", e))?,
        })
    }

    fn topic_from_row(row: &PgRow) -> Result<TopicRecord> {
        Ok(TopicRecord {
            id: row.try_get("id").map_err(|e| Error::backend("id", e))?,
            user_id: row
                .try_get("user_id")
                .map_err(|e| Error::backend("user_id", e))?,
            title: row
                .try_get("title")
                .map_err(|e| Error::backend("title", e))?,
            slug: row.try_get("slug").map_err(|e| Error::backend("slug", e))?,
            description: row
                .try_get("description")
                .map_err(|e| Error::backend("description", e))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| Error::backend("created_at", e))?,
        })
    }

    fn log_from_row(row: &PgRow) -> Result<StudyLogRecord> {
        Ok(StudyLogRecord {
            id: row.try_get("id").map_err(|e| Error::backend("id", e))?,
            user_id: row
                .try_get("user_id")
                .map_err(|e| Error::backend("user_id", e))?,
            topic_id: row
                .try_get("topic_id")
                .map_err(|e| Error::backend("topic_id", e))?,
            duration_in_minutes: row
                .try_get("duration_in_minutes")
                .map_err(|e| Error::backend("duration_in_minutes", e))?,
            notes: row
                .try_get("notes")
                .map_err(|e| Error::backend("notes", e))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| Error::backend("created_at", e))?,
        })
    }

    fn resource_from_row(row: &PgRow) -> Result<ResourceRecord> {
        Ok(ResourceRecord {
            id: row.try_get("id").map_err(|e| Error::backend("id", e))?,
            topic_id: row
                .try_get("topic_id")
                .map_err(|e| Error::backend("topic_id", e))?,
            source: row
                .try_get("source")
                .map_err(|e| Error::backend("source", e))?,
            title: row
                .try_get("title")
                .map_err(|e| Error::backend("title", e))?,
            url: row.try_get("url").map_err(|e| Error::backend("url", e))?,
            snippet: row
                .try_get("snippet")
                .map_err(|e| Error::backend("snippet", e))?,
            extra: row
                .try_get("extra")
                .map_err(|e| Error::backend("extra", e))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| Error::backend("created_at", e))?,
        })
    }

    fn log_resource_from_row(row: &PgRow) -> Result<StudyLogResourceRecord> {
        Ok(StudyLogResourceRecord {
            id: row.try_get("id").map_err(|e| Error::backend("id", e))?,
            study_log_id: row
                .try_get("study_log_id")
                .map_err(|e| Error::backend("study_log_id", e))?,
            title: row
                .try_get("title")
                .map_err(|e| Error::backend("title", e))?,
            snippet: row
                .try_get("snippet")
                .map_err(|e| Error::backend("snippet", e))?,
            source: row
                .try_get("source")
                .map_err(|e| Error::backend("source", e))?,
            url: row.try_get("url").map_err(|e| Error::backend("url", e))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| Error::backend("created_at", e))?,
        })
    }

    fn session_from_row(row: &PgRow) -> Result<SessionRecord> {
        let data: Json<SessionData> = row
            .try_get("data")
            .map_err(|e| Error::backend("session data", e))?;
        Ok(SessionRecord {
            token_hash: row
                .try_get("token_hash")
                .map_err(|e| Error::backend("token_hash", e))?,
            user_id: row
                .try_get("user_id")
                .map_err(|e| Error::backend("user_id", e))?,
            data: data.0,
            created_at: row
                .try_get("created_at")
                .map_err(|e| Error::backend("created_at", e))?,
            expires_at: row
                .try_get("expires_at")
                .map_err(|e| Error::backend("expires_at", e))?,
        })
    }
}

#[async_trait]
impl TrackerDb for PostgresTrackerDb {
    #[tracing::instrument(level = "debug", skip(self, user), fields(email = %user.email))]
    async fn create_user(&self, user: &NewUser) -> Result<UserRecord> {
        if user.password_hash.is_none() && user.google_id.is_none() {
            return Err(Error::InvalidInput(
                "user needs a password or a google account".to_string(),
            ));
        }
        let row = sqlx::query(&format!(
            "INSERT INTO users (email, username, password_hash, google_id)
             VALUES ($1, $2, $3, $4)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.google_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("insert user", e))?;
        Self::user_from_row(&row)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::backend("get user", e))?;
        row.as_ref().map(Self::user_from_row).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, email))]
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::backend("find user by email", e))?;
        row.as_ref().map(Self::user_from_row).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, email))]
    async fn find_user_for_google(
        &self,
        google_id: &str,
        email: Option<&str>,
    ) -> Result<Option<UserRecord>> {
        // Prefer the google_id match when both an id match and an email match exist.
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE google_id = $1 OR ($2::TEXT IS NOT NULL AND email = $2)
             ORDER BY (google_id = $1) DESC NULLS LAST, id
             LIMIT 1"
        ))
        .bind(google_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::backend("find user for google", e))?;
        row.as_ref().map(Self::user_from_row).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, google_id))]
    async fn link_google_id(&self, user_id: UserId, google_id: &str) -> Result<()> {
        sqlx::query("UPDATE users SET google_id = $1 WHERE id = $2")
            .bind(google_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::from_sqlx("link google id", e))?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, topic), fields(user_id = %topic.user_id))]
    async fn create_topic(&self, topic: &NewTopic) -> Result<TopicRecord> {
        let row = sqlx::query(&format!(
            "INSERT INTO topics (user_id, title, slug, description)
             VALUES ($1, $2, $3, $4)
             RETURNING {TOPIC_COLUMNS}"
        ))
        .bind(topic.user_id)
        .bind(&topic.title)
        .bind(&topic.slug)
        .bind(&topic.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("insert topic", e))?;
        Self::topic_from_row(&row)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_topic(&self, user_id: UserId, topic_id: TopicId) -> Result<Option<TopicRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {TOPIC_COLUMNS} FROM topics WHERE id = $1 AND user_id = $2"
        ))
        .bind(topic_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::backend("get topic", e))?;
        row.as_ref().map(Self::topic_from_row).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_topics(&self, user_id: UserId) -> Result<Vec<TopicRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {TOPIC_COLUMNS} FROM topics WHERE user_id = $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::backend("list topics", e))?;
        rows.iter().map(Self::topic_from_row).collect()
    }

    #[tracing::instrument(level = "info", skip(self))]
    async fn delete_topic_cascade(
        &self,
        user_id: UserId,
        topic_id: TopicId,
    ) -> Result<CascadeReport> {
        let owned = sqlx::query("SELECT id FROM topics WHERE id = $1 AND user_id = $2")
            .bind(topic_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::backend("check topic owner", e))?;
        if owned.is_none() {
            return Err(Error::NotFound(format!("topic {topic_id}")));
        }

        let mut report = CascadeReport::default();
        report.study_log_resources = sqlx::query(
            "DELETE FROM study_log_resources
             WHERE study_log_id IN (
               SELECT id FROM study_logs WHERE topic_id = $1 AND user_id = $2
             )",
        )
        .bind(topic_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::backend("delete topic study log resources", e))?
        .rows_affected();

        report.study_logs =
            sqlx::query("DELETE FROM study_logs WHERE topic_id = $1 AND user_id = $2")
                .bind(topic_id)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::backend("delete topic study logs", e))?
                .rows_affected();

        report.resources = sqlx::query("DELETE FROM resources WHERE topic_id = $1")
            .bind(topic_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::backend("delete topic resources", e))?
            .rows_affected();

        report.topics = sqlx::query("DELETE FROM topics WHERE id = $1 AND user_id = $2")
            .bind(topic_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::backend("delete topic", e))?
            .rows_affected();

        Ok(report)
    }

    #[tracing::instrument(level = "debug", skip(self, log), fields(topic_id = %log.topic_id))]
    async fn create_study_log(&self, log: &NewStudyLog) -> Result<StudyLogRecord> {
        let row = sqlx::query(&format!(
            "INSERT INTO study_logs (user_id, topic_id, duration_in_minutes, notes)
             VALUES ($1, $2, $3, $4)
             RETURNING {LOG_COLUMNS}"
        ))
        .bind(log.user_id)
        .bind(log.topic_id)
        .bind(log.duration_in_minutes)
        .bind(&log.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("insert study log", e))?;
        Self::log_from_row(&row)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_study_log(
        &self,
        user_id: UserId,
        log_id: StudyLogId,
    ) -> Result<Option<StudyLogRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM study_logs WHERE id = $1 AND user_id = $2"
        ))
        .bind(log_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::backend("get study log", e))?;
        row.as_ref().map(Self::log_from_row).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_topic_study_logs(
        &self,
        user_id: UserId,
        topic_id: TopicId,
    ) -> Result<Vec<StudyLogRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM study_logs WHERE topic_id = $1 AND user_id = $2
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(topic_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::backend("list topic study logs", e))?;
        rows.iter().map(Self::log_from_row).collect()
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
             WHERE sl.user_id = $1
             ORDER BY sl.created_at DESC, sl.id DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::backend("list recent study logs", e))?;

        rows.iter()
            .map(|row| {
                Ok(StudyLogSummary {
                    log: Self::log_from_row(row)?,
                    topic_title: row
                        .try_get("topic_title")
                        .map_err(|e| Error::backend("topic_title", e))?,
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
        let owned = sqlx::query("SELECT id FROM study_logs WHERE id = $1 AND user_id = $2")
            .bind(log_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::backend("check study log owner", e))?;
        if owned.is_none() {
            return Err(Error::NotFound(format!("study log {log_id}")));
        }

        let mut report = CascadeReport::default();
        report.study_log_resources =
            sqlx::query("DELETE FROM study_log_resources WHERE study_log_id = $1")
                .bind(log_id)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::backend("delete study log resources", e))?
                .rows_affected();

        report.study_logs = sqlx::query("DELETE FROM study_logs WHERE id = $1 AND user_id = $2")
            .bind(log_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::backend("delete study log", e))?
            .rows_affected();

        Ok(report)
    }

    #[tracing::instrument(level = "debug", skip(self, resource), fields(topic_id = %resource.topic_id))]
    async fn add_resource(&self, resource: &NewResource) -> Result<ResourceRecord> {
        let row = sqlx::query(&format!(
            "INSERT INTO resources (topic_id, source, title, url, snippet, extra)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {RESOURCE_COLUMNS}"
        ))
        .bind(resource.topic_id)
        .bind(&resource.source)
        .bind(&resource.title)
        .bind(&resource.url)
        .bind(&resource.snippet)
        .bind(&resource.extra)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("insert resource", e))?;
        Self::resource_from_row(&row)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_topic_resources(&self, topic_id: TopicId) -> Result<Vec<ResourceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE topic_id = $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::backend("list topic resources", e))?;
        rows.iter().map(Self::resource_from_row).collect()
    }

    #[tracing::instrument(level = "debug", skip(self, resource), fields(study_log_id = %resource.study_log_id))]
    async fn add_study_log_resource(
        &self,
        resource: &NewStudyLogResource,
    ) -> Result<StudyLogResourceRecord> {
        let row = sqlx::query(&format!(
            "INSERT INTO study_log_resources (study_log_id, title, snippet, source, url)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {LOG_RESOURCE_COLUMNS}"
        ))
        .bind(resource.study_log_id)
        .bind(&resource.title)
        .bind(&resource.snippet)
        .bind(&resource.source)
        .bind(&resource.url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("insert study log resource", e))?;
        Self::log_resource_from_row(&row)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_study_log_resources(
        &self,
        log_id: StudyLogId,
    ) -> Result<Vec<StudyLogResourceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOG_RESOURCE_COLUMNS} FROM study_log_resources WHERE study_log_id = $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(log_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::backend("list study log resources", e))?;
        rows.iter().map(Self::log_resource_from_row).collect()
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn insert_session(&self, session: &SessionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, data, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&session.token_hash)
        .bind(session.user_id)
        .bind(Json(&session.data))
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx("insert session", e))?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn get_session(&self, token_hash: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query(
            "SELECT token_hash, user_id, data, created_at, expires_at
             FROM sessions WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::backend("get session", e))?;
        row.as_ref().map(Self::session_from_row).transpose()
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn update_session(&self, session: &SessionRecord) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET user_id = $2, data = $3, expires_at = $4
             WHERE token_hash = $1",
        )
        .bind(&session.token_hash)
        .bind(session.user_id)
        .bind(Json(&session.data))
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::backend("update session", e))?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn delete_session(&self, token_hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::backend("delete session", e))?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let res = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::backend("prune sessions", e))?;
        Ok(res.rows_affected())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::backend("ping postgres", e))?;
        Ok(())
    }
}
