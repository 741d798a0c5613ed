//! Feed, bus and wire models

pub mod envelope;
pub mod feed;
pub mod wire;

pub use envelope::{DatabaseEventMessage, Envelope, EventEnvelope, TriggerAck};
pub use feed::{ChangeType, DbType, FeedEvent};
pub use wire::{LiveQueryOptions, Message, RealtimeRequest, RealtimeResponse};
