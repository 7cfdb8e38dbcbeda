//! Knowledge tracker core library: records, storage, and the traits shared by
//! the integrations and the HTTP server.

pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod o11y;
pub mod password;
pub mod search;
pub mod slug;
pub mod store;

pub use config::{
    DatabaseConfig, GoogleOAuthConfig, PostgresConfig, SearchConfig, SessionConfig, TrackerConfig,
};
pub use error::{Error, Result};
pub use identity::{ExternalProfile, IdentityProvider};
pub use models::{
    CascadeReport, Flash, FlashKind, NewResource, NewStudyLog, NewStudyLogResource, NewTopic,
    NewUser, PendingOAuth, ResourceId, ResourceRecord, SessionData, SessionRecord, StudyLogId,
    StudyLogRecord, StudyLogResourceId, StudyLogResourceRecord, StudyLogSummary, TopicId,
    TopicRecord, UserId, UserRecord,
};
pub use search::{SearchPage, SearchProvider, SearchRequest, SearchResult};
pub use store::{PostgresTrackerDb, SqliteTrackerDb, TrackerDb};
