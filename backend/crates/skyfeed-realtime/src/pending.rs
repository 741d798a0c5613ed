//! Subscriber side of the intent/ack protocol.
//!
//! Intents are parked until their ack arrives: a positive ack releases the
//! parked feed to the dispatcher, a negative one discards it. Intents whose
//! ack never shows up are resolved against storage by a periodic sweep.

use crate::dispatcher::FeedDispatcher;
use crate::resolver::DocumentResolver;
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use skyfeed_bus::{BusMessage, MessageHandler};
use skyfeed_commons::{ChangeType, Envelope, FeedEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct PendingIntent {
    event: FeedEvent,
    received_at: Instant,
}

pub struct PendingIntents {
    entries: DashMap<String, PendingIntent>,
    dispatcher: Arc<FeedDispatcher>,
    resolver: Arc<DocumentResolver>,
    ttl: Mutex<Duration>,
}

impl PendingIntents {
    pub fn new(
        dispatcher: Arc<FeedDispatcher>,
        resolver: Arc<DocumentResolver>,
        ttl: Duration,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            dispatcher,
            resolver,
            ttl: Mutex::new(ttl),
        }
    }

    pub fn set_ttl(&self, ttl: Duration) {
        *self.ttl.lock() = ttl;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub async fn handle_envelope(&self, envelope: Envelope) {
        match envelope {
            Envelope::Intent { id, data } => {
                self.entries.insert(
                    id,
                    PendingIntent {
                        event: data,
                        received_at: Instant::now(),
                    },
                );
            },
            Envelope::Ack { id, data: false } => {
                if self.entries.remove(&id).is_some() {
                    trace!("Intent {} rejected", id);
                }
            },
            Envelope::Ack { id, data: true } => match self.entries.remove(&id) {
                Some((_, pending)) => {
                    self.dispatcher.submit(pending.event).await;
                },
                // already flushed by the sweeper
                None => trace!("Ack for unknown intent {}", id),
            },
        }
    }

    /// Resolve every intent older than the ttl.
    ///
    /// Writes and updates are re-read and sent with the stored document;
    /// deletes are sent only if the document is gone. Returns the number of
    /// entries flushed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let ttl = *self.ttl.lock();
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| now.duration_since(entry.received_at) > ttl)
            .map(|entry| entry.key().clone())
            .collect();

        let mut flushed = 0;
        for id in stale {
            let Some((_, pending)) = self.entries.remove(&id) else {
                continue;
            };
            self.resolve(pending.event).await;
            flushed += 1;
        }

        if flushed > 0 {
            debug!("Flushed {} stale intents", flushed);
        }
        flushed
    }

    async fn resolve(&self, mut event: FeedEvent) {
        let read = self
            .resolver
            .fetch(event.db_type, &event.group, &event.doc_id)
            .await;

        match (event.change_type, read) {
            (ChangeType::Write | ChangeType::Update, Ok(doc)) => {
                event.payload = Some(doc);
                event.touch();
                self.dispatcher.submit(event).await;
            },
            (ChangeType::Delete, Err(_)) => {
                self.dispatcher.submit(event).await;
            },
            _ => trace!("Dropping stale {} intent for doc {}", event.change_type, event.doc_id),
        }
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `cancel` fires
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let pending = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        pending.sweep().await;
                    },
                }
            }
            debug!("Stale intent sweeper stopped");
        })
    }
}

#[async_trait]
impl MessageHandler for PendingIntents {
    async fn handle(&self, message: BusMessage) {
        match serde_json::from_slice::<Envelope>(&message.data) {
            Ok(envelope) => self.handle_envelope(envelope).await,
            Err(e) => warn!("Invalid envelope on '{}': {}", message.subject, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RealtimeError, Result};
    use crate::registry::SubscriptionRegistry;
    use crate::sink::FeedSink;
    use crate::traits::{ReadRequest, StorageReader};
    use serde_json::{json, Value as JsonValue};
    use skyfeed_commons::{ClientId, DbType, QueryId};
    use tokio::sync::mpsc;

    struct DocStorage {
        docs: Mutex<Vec<JsonValue>>,
    }

    #[async_trait]
    impl StorageReader for DocStorage {
        async fn read(
            &self,
            _project: &str,
            _db_type: DbType,
            _collection: &str,
            request: ReadRequest,
        ) -> Result<JsonValue> {
            let docs = self.docs.lock();
            let (field, value) = request
                .find
                .as_object()
                .and_then(|find| find.iter().next())
                .ok_or_else(|| RealtimeError::Storage("empty find".to_string()))?;
            docs.iter()
                .find(|doc| doc.get(field) == Some(value))
                .cloned()
                .ok_or_else(|| RealtimeError::Storage("not found".to_string()))
        }
    }

    struct Fixture {
        pending: Arc<PendingIntents>,
        dispatcher: Arc<FeedDispatcher>,
        feeds: mpsc::UnboundedReceiver<FeedEvent>,
    }

    fn fixture(docs: Vec<JsonValue>) -> Fixture {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (tx, feeds) = mpsc::unbounded_channel();
        let sink: Arc<dyn FeedSink> = Arc::new(tx);
        registry.add_live_query(QueryId::new("q1"), "orders", ClientId::new("c1"), json!({}), sink);

        let dispatcher = Arc::new(FeedDispatcher::new(registry));
        dispatcher.start(1, 5);
        let storage = Arc::new(DocStorage {
            docs: Mutex::new(docs),
        });
        let pending = Arc::new(PendingIntents::new(
            Arc::clone(&dispatcher),
            Arc::new(DocumentResolver::new("shop", storage)),
            Duration::from_secs(30),
        ));
        Fixture {
            pending,
            dispatcher,
            feeds,
        }
    }

    fn intent(id: &str, change_type: ChangeType, doc_id: &str) -> Envelope {
        Envelope::Intent {
            id: id.to_string(),
            data: FeedEvent::new(
                "orders",
                doc_id,
                change_type,
                Some(json!({"_id": doc_id, "v": 1})),
                DbType::Mongo,
            ),
        }
    }

    fn ack(id: &str, data: bool) -> Envelope {
        Envelope::Ack {
            id: id.to_string(),
            data,
        }
    }

    async fn drain(f: Fixture) -> Vec<FeedEvent> {
        let Fixture {
            dispatcher,
            mut feeds,
            ..
        } = f;
        dispatcher.stop().await;
        let mut out = Vec::new();
        while let Ok(feed) = feeds.try_recv() {
            out.push(feed);
        }
        out
    }

    #[tokio::test]
    async fn test_positive_ack_releases_intent() {
        let f = fixture(vec![]);
        f.pending.handle_envelope(intent("m1", ChangeType::Write, "1")).await;
        assert!(f.pending.contains("m1"));

        f.pending.handle_envelope(ack("m1", true)).await;
        assert!(f.pending.is_empty());

        let feeds = drain(f).await;
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].doc_id, "1");
    }

    #[tokio::test]
    async fn test_negative_and_unknown_acks_deliver_nothing() {
        let f = fixture(vec![]);
        f.pending.handle_envelope(intent("m1", ChangeType::Write, "1")).await;
        f.pending.handle_envelope(ack("m1", false)).await;
        f.pending.handle_envelope(ack("m1", true)).await;
        f.pending.handle_envelope(ack("ghost", true)).await;

        assert!(f.pending.is_empty());
        assert!(drain(f).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_resolves_stale_intents_against_storage() {
        let f = fixture(vec![json!({"_id": "1", "v": 2}), json!({"_id": "3", "v": 1})]);
        // found: sent with the stored document
        f.pending.handle_envelope(intent("w", ChangeType::Update, "1")).await;
        // not found: dropped
        f.pending.handle_envelope(intent("x", ChangeType::Write, "2")).await;
        // gone: delete is sent
        f.pending.handle_envelope(intent("d", ChangeType::Delete, "4")).await;
        // still present: delete is dropped
        f.pending.handle_envelope(intent("k", ChangeType::Delete, "3")).await;

        assert_eq!(f.pending.sweep().await, 0);
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(f.pending.sweep().await, 4);
        assert!(f.pending.is_empty());

        let mut feeds = drain(f).await;
        feeds.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].doc_id, "1");
        assert_eq!(feeds[0].payload, Some(json!({"_id": "1", "v": 2})));
        assert_eq!(feeds[1].doc_id, "4");
        assert!(feeds[1].is_delete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_until_cancelled() {
        let f = fixture(vec![]);
        let cancel = CancellationToken::new();
        let sweeper = f.pending.spawn_sweeper(Duration::from_secs(120), cancel.clone());

        f.pending.handle_envelope(intent("x", ChangeType::Write, "9")).await;
        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(f.pending.is_empty());

        cancel.cancel();
        sweeper.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_bus_payload_is_ignored() {
        let f = fixture(vec![]);
        f.pending
            .handle(BusMessage::new(
                "realtime:shop:mongo:orders",
                None,
                bytes::Bytes::from_static(b"{"),
            ))
            .await;
        assert!(f.pending.is_empty());
    }
}
