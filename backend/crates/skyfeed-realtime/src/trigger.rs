//! Distributed trigger coordination
//!
//! Two responsibilities over the cluster trigger topic:
//!
//! - inbound: every node turns database events published on the topic into
//!   local feeds and answers on the message's reply subject
//! - outbound: a function trigger is only confirmed once every alive node
//!   has acknowledged the event (N-of-N) within the quorum timeout

use crate::dispatcher::FeedDispatcher;
use crate::traits::ClusterMembership;
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::Mutex;
use skyfeed_bus::{handler_fn, Bus, BusMessage, MessageHandler, Subscription};
use skyfeed_commons::topics::{reply_topic, TRIGGER_TOPIC};
use skyfeed_commons::{EventEnvelope, FeedEvent, TriggerAck};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Result of a cluster-wide function trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Every alive node acknowledged
    Acknowledged,
    /// The payload is not a database event
    DecodeFailed,
    /// The deadline passed before all acks arrived
    TimedOut,
    /// Subscribing to the reply subject or publishing failed
    BusFailed,
    /// Membership reports no alive node
    NoAliveNodes,
}

impl TriggerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TriggerOutcome::Acknowledged)
    }
}

/// Decode a trigger topic payload down to a feed event
fn decode_event(data: &[u8]) -> Result<FeedEvent, String> {
    let envelope: EventEnvelope =
        serde_json::from_slice(data).map_err(|e| format!("invalid event envelope: {}", e))?;
    let message = envelope
        .decode_message()
        .map_err(|e| format!("invalid database event: {}", e))?;
    let event_type = message.event_type.clone();
    message
        .into_feed_event()
        .ok_or_else(|| format!("unknown event type '{}'", event_type))
}

async fn publish_ack(bus: &dyn Bus, reply: Option<&str>, ack: bool) {
    let Some(reply) = reply else {
        return;
    };
    let data = match serde_json::to_vec(&TriggerAck { ack }) {
        Ok(data) => Bytes::from(data),
        Err(e) => {
            warn!("Failed to encode trigger ack: {}", e);
            return;
        },
    };
    if let Err(e) = bus.publish(reply, data).await {
        warn!("Failed to publish trigger ack on '{}': {}", reply, e);
    }
}

/// Inbound side: bus handler feeding the local dispatcher
struct InboundEvents {
    bus: Arc<dyn Bus>,
    dispatcher: Arc<FeedDispatcher>,
}

#[async_trait]
impl MessageHandler for InboundEvents {
    async fn handle(&self, message: BusMessage) {
        match decode_event(&message.data) {
            Ok(event) => {
                self.dispatcher.submit(event).await;
                publish_ack(self.bus.as_ref(), message.reply.as_deref(), true).await;
            },
            Err(reason) => {
                warn!("Rejecting event on '{}': {}", message.subject, reason);
                publish_ack(self.bus.as_ref(), message.reply.as_deref(), false).await;
            },
        }
    }
}

pub struct TriggerCoordinator {
    bus: Arc<dyn Bus>,
    dispatcher: Arc<FeedDispatcher>,
    membership: Arc<dyn ClusterMembership>,
    quorum_timeout: Duration,
    inbound: Mutex<Option<Subscription>>,
}

impl TriggerCoordinator {
    pub fn new(
        bus: Arc<dyn Bus>,
        dispatcher: Arc<FeedDispatcher>,
        membership: Arc<dyn ClusterMembership>,
        quorum_timeout: Duration,
    ) -> Self {
        Self {
            bus,
            dispatcher,
            membership,
            quorum_timeout,
            inbound: Mutex::new(None),
        }
    }

    /// Subscribe this node to the trigger topic. Idempotent.
    pub async fn start(&self) -> crate::Result<()> {
        if self.is_listening() {
            return Ok(());
        }

        let handler = Arc::new(InboundEvents {
            bus: Arc::clone(&self.bus),
            dispatcher: Arc::clone(&self.dispatcher),
        });
        let subscription = self.bus.subscribe(TRIGGER_TOPIC, handler).await?;

        let previous = self.inbound.lock().replace(subscription);
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
        info!("Listening for cluster events on '{}'", TRIGGER_TOPIC);
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(subscription) = self.inbound.lock().take() {
            subscription.unsubscribe();
            debug!("Stopped listening on '{}'", TRIGGER_TOPIC);
        }
    }

    pub fn is_listening(&self) -> bool {
        self.inbound
            .lock()
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// Publish `payload` (an [`EventEnvelope`]) to every alive node and wait
    /// for all of them to acknowledge it.
    ///
    /// Only positive acks count. The reply subscription is removed before
    /// returning, whatever the outcome.
    pub async fn trigger_function(&self, payload: &[u8]) -> TriggerOutcome {
        if let Err(reason) = decode_event(payload) {
            debug!("Rejecting function trigger: {}", reason);
            return TriggerOutcome::DecodeFailed;
        }

        let expected = self.membership.alive_node_count();
        if expected == 0 {
            warn!("No alive nodes to acknowledge function trigger");
            return TriggerOutcome::NoAliveNodes;
        }

        let remaining = Arc::new(AtomicUsize::new(expected));
        let done = Arc::new(Notify::new());
        let handler = {
            let remaining = Arc::clone(&remaining);
            let done = Arc::clone(&done);
            handler_fn(move |message: BusMessage| {
                let remaining = Arc::clone(&remaining);
                let done = Arc::clone(&done);
                async move {
                    let positive = serde_json::from_slice::<TriggerAck>(&message.data)
                        .map(|ack| ack.ack)
                        .unwrap_or(false);
                    if !positive {
                        return;
                    }
                    let previous = remaining
                        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
                    if previous == Ok(1) {
                        done.notify_one();
                    }
                }
            })
        };

        let reply = reply_topic(&uuid::Uuid::new_v4().to_string());
        let subscription = match self.bus.subscribe(&reply, handler).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!("Failed to subscribe to '{}': {}", reply, e);
                return TriggerOutcome::BusFailed;
            },
        };

        let outcome = match self
            .bus
            .publish_request(TRIGGER_TOPIC, &reply, Bytes::copy_from_slice(payload))
            .await
        {
            Ok(()) => match tokio::time::timeout(self.quorum_timeout, done.notified()).await {
                Ok(()) => TriggerOutcome::Acknowledged,
                Err(_) => {
                    warn!(
                        "Function trigger timed out: {} of {} nodes acknowledged",
                        expected - remaining.load(Ordering::Acquire),
                        expected
                    );
                    TriggerOutcome::TimedOut
                },
            },
            Err(e) => {
                warn!("Failed to publish function trigger: {}", e);
                TriggerOutcome::BusFailed
            },
        };

        subscription.unsubscribe();
        outcome
    }

    /// Bus handler for function call requests: runs
    /// [`trigger_function`](Self::trigger_function) and answers the caller
    /// on the request's reply subject.
    pub fn function_call_handler(self: &Arc<Self>) -> Arc<dyn MessageHandler> {
        let coordinator = Arc::clone(self);
        handler_fn(move |message: BusMessage| {
            let coordinator = Arc::clone(&coordinator);
            async move {
                let outcome = coordinator.trigger_function(&message.data).await;
                publish_ack(
                    coordinator.bus.as_ref(),
                    message.reply.as_deref(),
                    outcome.is_success(),
                )
                .await;
            }
        })
    }
}
