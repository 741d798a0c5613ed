//! In-process bus.
//!
//! Each subscription owns an unbounded queue drained by its own task, so a
//! slow handler never blocks publishers or other subscriptions.

use crate::bus::{Bus, BusMessage, MessageHandler, Subscription, SubscriptionId};
use crate::error::{BusError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use log::{debug, trace};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Route {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<BusMessage>,
    cancel: CancellationToken,
}

impl Route {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }
}

/// In-memory bus with subject-exact routing
#[derive(Default, Clone)]
pub struct InMemoryBus {
    routes: Arc<DashMap<String, Vec<Route>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active subscriptions on `subject`
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.routes
            .get(subject)
            .map(|routes| routes.iter().filter(|r| r.is_active()).count())
            .unwrap_or(0)
    }

    /// Total number of active subscriptions across all subjects
    pub fn total_subscriptions(&self) -> usize {
        self.routes
            .iter()
            .map(|entry| entry.value().iter().filter(|r| r.is_active()).count())
            .sum()
    }

    fn route(&self, message: BusMessage) -> usize {
        let Some(routes) = self.routes.get(&message.subject) else {
            trace!("No subscribers on '{}', dropping message", message.subject);
            return 0;
        };

        let mut delivered = 0;
        for route in routes.iter().filter(|r| r.is_active()) {
            if route.tx.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    fn remove_route(routes: &DashMap<String, Vec<Route>>, subject: &str, id: &SubscriptionId) {
        if let Some(mut entries) = routes.get_mut(subject) {
            entries.retain(|r| &r.id != id);
            if entries.is_empty() {
                drop(entries);
                routes.remove_if(subject, |_, v| v.is_empty());
            }
        }
    }
}

#[async_trait]
impl Bus for InMemoryBus {
    async fn publish(&self, subject: &str, data: Bytes) -> Result<()> {
        if subject.is_empty() {
            return Err(BusError::InvalidSubject("subject cannot be empty".to_string()));
        }
        self.route(BusMessage::new(subject, None, data));
        Ok(())
    }

    async fn publish_request(&self, subject: &str, reply: &str, data: Bytes) -> Result<()> {
        if subject.is_empty() || reply.is_empty() {
            return Err(BusError::InvalidSubject(
                "subject and reply cannot be empty".to_string(),
            ));
        }
        self.route(BusMessage::new(subject, Some(reply.to_string()), data));
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        if subject.is_empty() {
            return Err(BusError::InvalidSubject("subject cannot be empty".to_string()));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<BusMessage>();
        let id = SubscriptionId::generate();
        let cancel = CancellationToken::new();

        self.routes.entry(subject.to_string()).or_default().push(Route {
            id: id.clone(),
            tx,
            cancel: cancel.clone(),
        });

        let routes = Arc::clone(&self.routes);
        let token = cancel.clone();
        let route_subject = subject.to_string();
        let route_id = id.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    message = rx.recv() => match message {
                        Some(message) => handler.handle(message).await,
                        None => break,
                    },
                }
            }
            Self::remove_route(&routes, &route_subject, &route_id);
            debug!("Subscription {} on '{}' closed", route_id, route_subject);
        });

        debug!("Subscription {} opened on '{}'", id, subject);
        Ok(Subscription::new(id, subject, cancel))
    }
}
