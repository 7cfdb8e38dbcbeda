use crate::Result;
use crate::models::{
    CascadeReport, NewResource, NewStudyLog, NewStudyLogResource, NewTopic, NewUser,
    ResourceRecord, SessionRecord, StudyLogId, StudyLogRecord, StudyLogResourceRecord,
    StudyLogSummary, TopicId, TopicRecord, UserId, UserRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Relational store behind every route.
///
/// Every method that reads or deletes owned data takes the caller's `UserId`
/// and filters on it; a row owned by someone else is indistinguishable from a
/// missing row. Multi-statement operations (cascades) run as sequential
/// statements without a transaction.
#[async_trait]
pub trait TrackerDb: Send + Sync {
    // Users.
    async fn create_user(&self, user: &NewUser) -> Result<UserRecord>;
    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>>;
    /// First user whose `google_id` matches, or whose email matches when given.
    async fn find_user_for_google(
        &self,
        google_id: &str,
        email: Option<&str>,
    ) -> Result<Option<UserRecord>>;
    async fn link_google_id(&self, user_id: UserId, google_id: &str) -> Result<()>;

    // Topics.
    async fn create_topic(&self, topic: &NewTopic) -> Result<TopicRecord>;
    async fn get_topic(&self, user_id: UserId, topic_id: TopicId) -> Result<Option<TopicRecord>>;
    async fn list_topics(&self, user_id: UserId) -> Result<Vec<TopicRecord>>;
    /// Removes the topic's study-log resources, study logs, resources, then the topic.
    async fn delete_topic_cascade(
        &self,
        user_id: UserId,
        topic_id: TopicId,
    ) -> Result<CascadeReport>;

    // Study logs.
    async fn create_study_log(&self, log: &NewStudyLog) -> Result<StudyLogRecord>;
    async fn get_study_log(
        &self,
        user_id: UserId,
        log_id: StudyLogId,
    ) -> Result<Option<StudyLogRecord>>;
    async fn list_topic_study_logs(
        &self,
        user_id: UserId,
        topic_id: TopicId,
    ) -> Result<Vec<StudyLogRecord>>;
    async fn list_recent_study_logs(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<StudyLogSummary>>;
    /// Removes the log's resources, then the log.
    async fn delete_study_log_cascade(
        &self,
        user_id: UserId,
        log_id: StudyLogId,
    ) -> Result<CascadeReport>;

    // Resources.
    async fn add_resource(&self, resource: &NewResource) -> Result<ResourceRecord>;
    async fn list_topic_resources(&self, topic_id: TopicId) -> Result<Vec<ResourceRecord>>;
    async fn add_study_log_resource(
        &self,
        resource: &NewStudyLogResource,
    ) -> Result<StudyLogResourceRecord>;
    async fn list_study_log_resources(
        &self,
        log_id: StudyLogId,
    ) -> Result<Vec<StudyLogResourceRecord>>;

    // Sessions.
    async fn insert_session(&self, session: &SessionRecord) -> Result<()>;
    async fn get_session(&self, token_hash: &str) -> Result<Option<SessionRecord>>;
    async fn update_session(&self, session: &SessionRecord) -> Result<()>;
    async fn delete_session(&self, token_hash: &str) -> Result<()>;
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Cheap connectivity probe used by `check` and `/health`.
    async fn ping(&self) -> Result<()>;
}
