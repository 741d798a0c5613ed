//! Client-facing messages for live query subscriptions.

use super::feed::{DbType, FeedEvent};
use crate::constants::TYPE_REALTIME_FEED;
use crate::ids::QueryId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Generic message exchanged with a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub data: JsonValue,
}

impl Message {
    pub fn new(id: impl Into<String>, message_type: impl Into<String>, data: JsonValue) -> Self {
        Self {
            id: id.into(),
            message_type: message_type.into(),
            data,
        }
    }

    /// Message pushing a feed to its subscriber.
    pub fn feed(feed: &FeedEvent) -> serde_json::Result<Self> {
        Ok(Self::new(String::new(), TYPE_REALTIME_FEED, serde_json::to_value(feed)?))
    }
}

/// Options attached to a subscribe request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveQueryOptions {
    /// Do not send the initial snapshot
    #[serde(default)]
    pub skip_initial: bool,
}

/// Subscribe / unsubscribe request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeRequest {
    #[serde(default)]
    pub id: QueryId,
    #[serde(default)]
    pub token: String,
    pub db_type: DbType,
    pub group: String,
    #[serde(rename = "where", default)]
    pub filter: JsonValue,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub options: LiveQueryOptions,
}

/// Response body for subscribe / unsubscribe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeResponse {
    pub group: String,
    pub id: QueryId,
    pub ack: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs: Option<Vec<FeedEvent>>,
}

impl RealtimeResponse {
    pub fn ok(group: impl Into<String>, id: QueryId, docs: Option<Vec<FeedEvent>>) -> Self {
        Self {
            group: group.into(),
            id,
            ack: true,
            error: None,
            docs,
        }
    }

    pub fn failed(group: impl Into<String>, id: QueryId, error: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            id,
            ack: false,
            error: Some(error.into()),
            docs: None,
        }
    }
}
