//! Envelopes carried on the bus.

use super::feed::{ChangeType, DbType, FeedEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Two-phase mutation broadcast.
///
/// An intent precedes its ack on the same topic and both share `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    Intent { id: String, data: FeedEvent },
    Ack { id: String, data: bool },
}

impl Envelope {
    pub fn id(&self) -> &str {
        match self {
            Envelope::Intent { id, .. } | Envelope::Ack { id, .. } => id,
        }
    }
}

/// Generic database event as published on the trigger topic.
///
/// `payload` holds a JSON-encoded [`DatabaseEventMessage`], so decoding is a
/// two step affair and either layer can fail independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: String,
}

impl EventEnvelope {
    pub fn new(message: &DatabaseEventMessage) -> serde_json::Result<Self> {
        Ok(Self {
            event_type: message.event_type.clone(),
            payload: serde_json::to_string(message)?,
        })
    }

    pub fn decode_message(&self) -> serde_json::Result<DatabaseEventMessage> {
        serde_json::from_str(&self.payload)
    }
}

/// Database change as reported by the storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseEventMessage {
    #[serde(rename = "docId")]
    pub doc_id: String,
    pub col: String,
    #[serde(rename = "dbType")]
    pub db_type: DbType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<JsonValue>,
    #[serde(rename = "type")]
    pub event_type: String,
}

impl DatabaseEventMessage {
    pub fn new(
        change_type: ChangeType,
        db_type: DbType,
        col: impl Into<String>,
        doc_id: impl Into<String>,
        doc: Option<JsonValue>,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            col: col.into(),
            db_type,
            doc,
            event_type: change_type.event_type().to_string(),
        }
    }

    /// Convert into a feed event, or `None` when the event type is unknown.
    pub fn into_feed_event(self) -> Option<FeedEvent> {
        let change_type = ChangeType::from_event_type(&self.event_type)?;
        Some(FeedEvent::new(self.col, self.doc_id, change_type, self.doc, self.db_type))
    }
}

/// Answer published on a reply subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerAck {
    pub ack: bool,
}
