use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdParseError {
    #[error("invalid id: {0}")]
    InvalidId(String),
}

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let id = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| IdParseError::InvalidId(s.to_string()))?;
                Ok(Self(id))
            }
        }
    };
}

row_id!(
    /// Primary key of a `users` row.
    UserId
);
row_id!(
    /// Primary key of a `topics` row.
    TopicId
);
row_id!(
    /// Primary key of a `study_logs` row.
    StudyLogId
);
row_id!(ResourceId);
row_id!(StudyLogResourceId);

/// A registered account. At least one of `password_hash` / `google_id` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub id: TopicId,
    pub user_id: UserId,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopic {
    pub user_id: UserId,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyLogRecord {
    pub id: StudyLogId,
    pub user_id: UserId,
    pub topic_id: TopicId,
    pub duration_in_minutes: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Study log joined with its topic title, as listed on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyLogSummary {
    pub log: StudyLogRecord,
    pub topic_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudyLog {
    pub user_id: UserId,
    pub topic_id: TopicId,
    pub duration_in_minutes: i64,
    pub notes: Option<String>,
}

/// External reference attached to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub topic_id: TopicId,
    pub source: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub snippet: Option<String>,
    pub extra: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewResource {
    pub topic_id: TopicId,
    pub source: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub snippet: Option<String>,
    pub extra: Option<serde_json::Value>,
}

/// External reference attached to a study log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyLogResourceRecord {
    pub id: StudyLogResourceId,
    pub study_log_id: StudyLogId,
    pub title: String,
    pub snippet: Option<String>,
    pub source: Option<String>,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudyLogResource {
    pub study_log_id: StudyLogId,
    pub title: String,
    pub snippet: Option<String>,
    pub source: Option<String>,
    pub url: String,
}

/// Row counts removed by an application-level cascade.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub study_log_resources: u64,
    pub study_logs: u64,
    pub resources: u64,
    pub topics: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashKind {
    Success,
    Error,
}

impl FlashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashKind::Success => "success",
            FlashKind::Error => "error",
        }
    }
}

/// One-time status message shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

/// In-flight Google sign-in, bound to the browser session that started it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOAuth {
    pub state: String,
    pub code_verifier: String,
}

/// Mutable payload of a session row (stored as JSON).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub flashes: Vec<Flash>,
    #[serde(default)]
    pub oauth: Option<PendingOAuth>,
}

impl SessionData {
    pub fn is_empty(&self) -> bool {
        self.flashes.is_empty() && self.oauth.is_none()
    }
}

/// Server-side session. The cookie carries the raw token; only its hash is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub token_hash: String,
    pub user_id: Option<UserId>,
    pub data: SessionData,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_and_reject_garbage() {
        assert_eq!("42".parse::<TopicId>().unwrap(), TopicId(42));
        assert_eq!(" 7 ".parse::<StudyLogId>().unwrap(), StudyLogId(7));
        assert!("abc".parse::<UserId>().is_err());
        assert!("".parse::<TopicId>().is_err());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let user = UserRecord {
            id: UserId(1),
            email: "a@example.com".into(),
            username: "a".into(),
            password_hash: Some("$argon2id$secret".into()),
            google_id: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
    }

    #[test]
    fn session_data_tolerates_missing_fields() {
        let data: SessionData = serde_json::from_str("{}").unwrap();
        assert!(data.flashes.is_empty());
        assert!(data.oauth.is_none());
    }
}
