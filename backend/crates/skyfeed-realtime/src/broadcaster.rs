//! Intent/ack broadcasting for mutations.
//!
//! Before a mutation is applied the caller publishes an intent carrying the
//! feed it is about to cause; once the outcome is known it publishes an ack
//! with the same id on the same topic. Delivery is best-effort: publish
//! failures are logged and never reach the caller.

use bytes::Bytes;
use log::{trace, warn};
use serde_json::Value as JsonValue;
use skyfeed_bus::Bus;
use skyfeed_commons::topics::group_topic;
use skyfeed_commons::{ChangeType, DbType, Envelope, FeedEvent};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle to a published intent, needed to send its ack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationIntent {
    pub id: String,
    pub topic: String,
}

pub struct IntentBroadcaster {
    bus: Arc<dyn Bus>,
    project: String,
    enabled: Arc<AtomicBool>,
}

impl IntentBroadcaster {
    /// `enabled` is shared with the owning module and checked on every send
    pub fn new(bus: Arc<dyn Bus>, project: impl Into<String>, enabled: Arc<AtomicBool>) -> Self {
        Self {
            bus,
            project: project.into(),
            enabled,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Publish an intent for `event` under a fresh id.
    ///
    /// Returns `None` when the module is disabled.
    pub async fn send_intent(&self, event: &FeedEvent) -> Option<MutationIntent> {
        if !self.is_enabled() {
            return None;
        }

        let intent = MutationIntent {
            id: uuid::Uuid::new_v4().to_string(),
            topic: group_topic(&self.project, event.db_type, &event.group),
        };
        let envelope = Envelope::Intent {
            id: intent.id.clone(),
            data: event.clone(),
        };
        self.publish(&intent.topic, &envelope).await;
        Some(intent)
    }

    /// Confirm (`ack = true`) or discard an intent
    pub async fn send_ack(&self, intent: &MutationIntent, ack: bool) {
        if !self.is_enabled() {
            return;
        }

        let envelope = Envelope::Ack {
            id: intent.id.clone(),
            data: ack,
        };
        self.publish(&intent.topic, &envelope).await;
    }

    pub async fn send_create(
        &self,
        db_type: DbType,
        collection: &str,
        doc_id: &str,
        doc: JsonValue,
    ) -> Option<MutationIntent> {
        let event = FeedEvent::new(collection, doc_id, ChangeType::Write, Some(doc), db_type);
        self.send_intent(&event).await
    }

    pub async fn send_update(
        &self,
        db_type: DbType,
        collection: &str,
        doc_id: &str,
        doc: Option<JsonValue>,
    ) -> Option<MutationIntent> {
        let event = FeedEvent::new(collection, doc_id, ChangeType::Update, doc, db_type);
        self.send_intent(&event).await
    }

    pub async fn send_delete(
        &self,
        db_type: DbType,
        collection: &str,
        doc_id: &str,
    ) -> Option<MutationIntent> {
        let event = FeedEvent::new(collection, doc_id, ChangeType::Delete, None, db_type);
        self.send_intent(&event).await
    }

    /// Run `mutation` between an intent for `event` and its ack.
    ///
    /// The ack is positive iff the mutation succeeded; its result is
    /// returned untouched.
    pub async fn around_mutation<T, E, Fut>(&self, event: &FeedEvent, mutation: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let intent = self.send_intent(event).await;
        let result = mutation.await;
        if let Some(intent) = intent {
            self.send_ack(&intent, result.is_ok()).await;
        }
        result
    }

    async fn publish(&self, topic: &str, envelope: &Envelope) {
        let data = match serde_json::to_vec(envelope) {
            Ok(data) => Bytes::from(data),
            Err(e) => {
                warn!("Failed to encode envelope {}: {}", envelope.id(), e);
                return;
            },
        };

        match self.bus.publish(topic, data).await {
            Ok(()) => trace!("Published envelope {} on '{}'", envelope.id(), topic),
            Err(e) => warn!("Failed to publish envelope {} on '{}': {}", envelope.id(), topic, e),
        }
    }
}
