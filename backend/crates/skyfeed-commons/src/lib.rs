//! # skyfeed-commons
//!
//! Types shared by every skyfeed crate:
//! - Typed identifiers for clients and live queries
//! - Feed events, database types and change types
//! - Bus envelopes (intent/ack, database events, trigger acks)
//! - Client wire messages for subscribe/unsubscribe
//! - Bus topic naming

pub mod constants;
pub mod ids;
pub mod models;
pub mod topics;

pub use ids::{ClientId, QueryId};
pub use models::{
    ChangeType, DatabaseEventMessage, DbType, Envelope, EventEnvelope, FeedEvent,
    LiveQueryOptions, Message, RealtimeRequest, RealtimeResponse, TriggerAck,
};
