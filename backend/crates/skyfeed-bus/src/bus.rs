use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A message received from the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub subject: String,
    /// Subject the publisher expects answers on, if any
    pub reply: Option<String>,
    pub data: Bytes,
}

impl BusMessage {
    pub fn new(subject: impl Into<String>, reply: Option<String>, data: Bytes) -> Self {
        Self {
            subject: subject.into(),
            reply,
            data,
        }
    }
}

/// Callback invoked for each message delivered to a subscription.
///
/// Messages of one subscription are handled one at a time, in arrival order.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: BusMessage);
}

struct FnHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F, Fut>
where
    F: Fn(BusMessage) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn handle(&self, message: BusMessage) {
        (self.f)(message).await
    }
}

/// Wrap an async closure as a [`MessageHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(BusMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler {
        f,
        _marker: PhantomData,
    })
}

/// Identifier of one subscription on the bus
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a live subscription.
///
/// The bus implementation watches `cancel`; once cancelled no further message
/// reaches the handler and the subscription is removed from the bus.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    subject: String,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(id: SubscriptionId, subject: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            id,
            subject: subject.into(),
            cancel,
        }
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub fn unsubscribe(self) {
        self.cancel.cancel();
    }
}

/// Message bus collaborator.
///
/// Delivery is best-effort: publishing to a subject nobody listens on
/// succeeds and the message is dropped.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish `data` on `subject`
    async fn publish(&self, subject: &str, data: Bytes) -> Result<()>;

    /// Publish `data` on `subject`, asking receivers to answer on `reply`
    async fn publish_request(&self, subject: &str, reply: &str, data: Bytes) -> Result<()>;

    /// Route every message published on `subject` to `handler`
    async fn subscribe(&self, subject: &str, handler: Arc<dyn MessageHandler>)
        -> Result<Subscription>;
}
