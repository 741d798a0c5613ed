use crate::constants::{EVENT_DB_DELETE, EVENT_DB_INSERT, EVENT_DB_UPDATE};
use crate::ids::QueryId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Kind of change carried by a feed.
///
/// Creates are reported as `write`; `insert` is accepted on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    #[serde(alias = "insert")]
    Write,
    Update,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Write => "write",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
        }
    }

    /// Map a database event name (`DB_INSERT`, `DB_UPDATE`, `DB_DELETE`)
    /// onto the feed vocabulary.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            EVENT_DB_INSERT => Some(ChangeType::Write),
            EVENT_DB_UPDATE => Some(ChangeType::Update),
            EVENT_DB_DELETE => Some(ChangeType::Delete),
            _ => None,
        }
    }

    /// Inverse of [`ChangeType::from_event_type`].
    pub fn event_type(&self) -> &'static str {
        match self {
            ChangeType::Write => EVENT_DB_INSERT,
            ChangeType::Update => EVENT_DB_UPDATE,
            ChangeType::Delete => EVENT_DB_DELETE,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database backing a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Mongo,
    Postgres,
    Mysql,
    Sqlserver,
    Embedded,
}

impl DbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Mongo => "mongo",
            DbType::Postgres => "postgres",
            DbType::Mysql => "mysql",
            DbType::Sqlserver => "sqlserver",
            DbType::Embedded => "embedded",
        }
    }

    /// Name of the document identifier field for this database.
    pub fn id_field(&self) -> &'static str {
        match self {
            DbType::Mongo => "_id",
            _ => "id",
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongo" => Ok(DbType::Mongo),
            "postgres" => Ok(DbType::Postgres),
            "mysql" => Ok(DbType::Mysql),
            "sqlserver" => Ok(DbType::Sqlserver),
            "embedded" => Ok(DbType::Embedded),
            other => Err(format!("Unknown database type: {}", other)),
        }
    }
}

/// A single change notification for one document.
///
/// `query_id` is empty on the event as submitted and is filled in per
/// recipient at delivery time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEvent {
    pub group: String,
    pub doc_id: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
    /// Unix epoch milliseconds
    pub timestamp: i64,
    pub db_type: DbType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<QueryId>,
}

impl FeedEvent {
    /// Create an event stamped with the current time.
    pub fn new(
        group: impl Into<String>,
        doc_id: impl Into<String>,
        change_type: ChangeType,
        payload: Option<JsonValue>,
        db_type: DbType,
    ) -> Self {
        Self {
            group: group.into(),
            doc_id: doc_id.into(),
            change_type,
            payload,
            timestamp: now_millis(),
            db_type,
            query_id: None,
        }
    }

    /// Copy of this event addressed to one live query.
    pub fn for_query(&self, query_id: &QueryId) -> Self {
        Self {
            query_id: Some(query_id.clone()),
            ..self.clone()
        }
    }

    pub fn touch(&mut self) {
        self.timestamp = now_millis();
    }

    pub fn is_delete(&self) -> bool {
        self.change_type == ChangeType::Delete
    }
}

/// Current time in Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
