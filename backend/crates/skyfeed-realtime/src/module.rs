//! Realtime module
//!
//! Owns the registry, dispatcher, broadcaster and pending intent tracker,
//! and drives their lifecycle from [`RealtimeSettings`]. The module starts
//! disabled; `set_config` with `enabled = true` starts a fresh worker pool,
//! `enabled = false` drains and stops it.

use crate::broadcaster::IntentBroadcaster;
use crate::dispatcher::FeedDispatcher;
use crate::error::{RealtimeError, Result};
use crate::pending::PendingIntents;
use crate::registry::SubscriptionRegistry;
use crate::resolver::DocumentResolver;
use crate::sink::FeedSink;
use crate::traits::{AuthOperation, Authenticator, ReadRequest, StorageReader};
use log::{debug, info, warn};
use serde_json::{json, Value as JsonValue};
use skyfeed_bus::{handler_fn, Bus, BusMessage, MessageHandler, Subscription};
use skyfeed_commons::topics::group_topic;
use skyfeed_commons::{ChangeType, ClientId, DbType, FeedEvent, RealtimeRequest};
use skyfeed_configs::RealtimeSettings;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Lifecycle {
    settings: RealtimeSettings,
    sweeper: Option<(CancellationToken, JoinHandle<()>)>,
}

pub struct RealtimeModule {
    project: String,
    bus: Arc<dyn Bus>,
    storage: Arc<dyn StorageReader>,
    authenticator: Arc<dyn Authenticator>,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<FeedDispatcher>,
    broadcaster: Arc<IntentBroadcaster>,
    pending: Arc<PendingIntents>,
    enabled: Arc<AtomicBool>,
    lifecycle: Mutex<Lifecycle>,
    /// Group topic → subscription feeding the pending intent tracker
    group_topics: Mutex<HashMap<String, Subscription>>,
}

impl RealtimeModule {
    /// Create a disabled module for `project`
    pub fn new(
        project: impl Into<String>,
        bus: Arc<dyn Bus>,
        storage: Arc<dyn StorageReader>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let project = project.into();
        let settings = RealtimeSettings {
            enabled: false,
            ..Default::default()
        };
        let enabled = Arc::new(AtomicBool::new(false));
        let registry = Arc::new(SubscriptionRegistry::new());
        let resolver = Arc::new(DocumentResolver::new(project.clone(), Arc::clone(&storage)));
        let dispatcher = Arc::new(FeedDispatcher::with_resolver(
            Arc::clone(&registry),
            Arc::clone(&resolver),
        ));
        let broadcaster = Arc::new(IntentBroadcaster::new(
            Arc::clone(&bus),
            project.clone(),
            Arc::clone(&enabled),
        ));
        let pending = Arc::new(PendingIntents::new(
            Arc::clone(&dispatcher),
            resolver,
            settings.pending_intent_ttl(),
        ));

        Self {
            project,
            bus,
            storage,
            authenticator,
            registry,
            dispatcher,
            broadcaster,
            pending,
            enabled,
            lifecycle: Mutex::new(Lifecycle {
                settings,
                sweeper: None,
            }),
            group_topics: Mutex::new(HashMap::new()),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<FeedDispatcher> {
        &self.dispatcher
    }

    pub fn broadcaster(&self) -> &Arc<IntentBroadcaster> {
        &self.broadcaster
    }

    pub fn pending(&self) -> &Arc<PendingIntents> {
        &self.pending
    }

    pub async fn settings(&self) -> RealtimeSettings {
        self.lifecycle.lock().await.settings.clone()
    }

    /// Apply `settings`.
    ///
    /// Enabling starts `worker_count` workers over a new channel and the
    /// stale intent sweeper. Disabling stops both; buffered feeds are
    /// drained first. Changing the pool shape while enabled restarts it.
    pub async fn set_config(&self, settings: RealtimeSettings) {
        let mut lifecycle = self.lifecycle.lock().await;
        self.pending.set_ttl(settings.pending_intent_ttl());

        let running = self.dispatcher.is_running();
        let reshaped = settings.worker_count != lifecycle.settings.worker_count
            || settings.channel_capacity != lifecycle.settings.channel_capacity;

        if running && (!settings.enabled || reshaped) {
            self.enabled.store(false, Ordering::Release);
            self.dispatcher.stop().await;
            if let Some((cancel, sweeper)) = lifecycle.sweeper.take() {
                cancel.cancel();
                if let Err(e) = sweeper.await {
                    debug!("Stale intent sweeper ended abnormally: {}", e);
                }
            }
            info!("Realtime module disabled");
        }

        if settings.enabled && !self.dispatcher.is_running() {
            self.dispatcher
                .start(settings.worker_count, settings.channel_capacity);
            let cancel = CancellationToken::new();
            let sweeper = self
                .pending
                .spawn_sweeper(settings.pending_sweep_interval(), cancel.clone());
            lifecycle.sweeper = Some((cancel, sweeper));
            self.enabled.store(true, Ordering::Release);
            info!(
                "Realtime module enabled for project '{}' ({} workers)",
                self.project, settings.worker_count
            );
        }

        lifecycle.settings = settings;
    }

    /// Disable the module and drop every group topic subscription
    pub async fn shutdown(&self) {
        let settings = RealtimeSettings {
            enabled: false,
            ..self.settings().await
        };
        self.set_config(settings).await;

        let mut topics = self.group_topics.lock().await;
        for (_, subscription) in topics.drain() {
            subscription.unsubscribe();
        }
    }

    /// Queue `event` for dispatch; dropped while disabled
    pub async fn submit(&self, event: FeedEvent) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.dispatcher.submit(event).await
    }

    /// Register a live query for `client_id` and return its initial snapshot.
    ///
    /// Authorization, the snapshot and the intent topic always use the
    /// module's own project; a `project` in the request is ignored.
    pub async fn subscribe(
        &self,
        client_id: &ClientId,
        request: &RealtimeRequest,
        sink: Arc<dyn FeedSink>,
    ) -> Result<Vec<FeedEvent>> {
        if !self.is_enabled() {
            return Err(RealtimeError::Disabled);
        }
        if request.id.is_empty() {
            return Err(RealtimeError::InvalidRequest("missing live query id".to_string()));
        }
        if request.group.is_empty() {
            return Err(RealtimeError::InvalidRequest("missing group".to_string()));
        }

        if !request.project.is_empty() && request.project != self.project {
            debug!(
                "Ignoring project '{}' from client {}, serving '{}'",
                request.project, client_id, self.project
            );
        }
        let project = self.project.as_str();
        let filter = match &request.filter {
            JsonValue::Null => json!({}),
            filter => filter.clone(),
        };

        let auth = self
            .authenticator
            .is_authenticated(&request.token, request.db_type, &request.group, AuthOperation::Read)
            .await?;
        let args = json!({ "auth": auth.claims, "find": filter });
        self.authenticator
            .is_authorized(project, request.db_type, &request.group, AuthOperation::Read, &args)
            .await?;

        let docs = if request.options.skip_initial {
            Vec::new()
        } else {
            let rows = self
                .storage
                .read(project, request.db_type, &request.group, ReadRequest::all(filter.clone()))
                .await?;
            Self::initial_feeds(request, rows)?
        };

        self.registry.add_live_query(
            request.id.clone(),
            &request.group,
            client_id.clone(),
            filter,
            sink,
        );
        self.track_group_topic(project, request.db_type, &request.group)
            .await;

        debug!(
            "Client {} subscribed to '{}' as {} ({} initial docs)",
            client_id,
            request.group,
            request.id,
            docs.len()
        );
        Ok(docs)
    }

    /// Remove one live query; removing an unknown query is not an error
    pub fn unsubscribe(&self, client_id: &ClientId, request: &RealtimeRequest) {
        self.registry
            .remove_live_query(&request.group, client_id, &request.id);
    }

    /// Drop every live query of a disconnected client
    pub fn remove_client(&self, client_id: &ClientId) -> usize {
        self.registry.remove_client(client_id)
    }

    /// Project storage rows into `write` feeds; rows without an id are skipped
    fn initial_feeds(request: &RealtimeRequest, rows: JsonValue) -> Result<Vec<FeedEvent>> {
        let JsonValue::Array(rows) = rows else {
            return Err(RealtimeError::Storage(
                "expected a list of documents".to_string(),
            ));
        };

        let id_field = request.db_type.id_field();
        let feeds = rows
            .into_iter()
            .filter_map(|row| {
                let doc_id = match row.get(id_field)? {
                    JsonValue::String(id) => id.clone(),
                    JsonValue::Number(id) => id.to_string(),
                    _ => return None,
                };
                let feed = FeedEvent::new(
                    request.group.clone(),
                    doc_id,
                    ChangeType::Write,
                    Some(row),
                    request.db_type,
                );
                Some(feed.for_query(&request.id))
            })
            .collect();
        Ok(feeds)
    }

    /// Listen for intent/ack envelopes on the group's topic, once per topic
    async fn track_group_topic(&self, project: &str, db_type: DbType, group: &str) {
        let topic = group_topic(project, db_type, group);
        let mut topics = self.group_topics.lock().await;
        if topics.get(&topic).is_some_and(Subscription::is_active) {
            return;
        }

        let pending = Arc::clone(&self.pending);
        let enabled = Arc::clone(&self.enabled);
        let handler = handler_fn(move |message: BusMessage| {
            let pending = Arc::clone(&pending);
            let enabled = Arc::clone(&enabled);
            async move {
                if enabled.load(Ordering::Acquire) {
                    pending.handle(message).await;
                }
            }
        });

        match self.bus.subscribe(&topic, handler).await {
            Ok(subscription) => {
                debug!("Tracking intents on '{}'", topic);
                topics.insert(topic, subscription);
            },
            Err(e) => warn!("Failed to subscribe to '{}': {}", topic, e),
        }
    }

    pub async fn tracked_topics(&self) -> Vec<String> {
        self.group_topics.lock().await.keys().cloned().collect()
    }
}
