//! Delivery endpoints for feeds.
//!
//! A [`FeedSink`] is the capability stored on every live query; the
//! dispatcher hands it one addressed [`FeedEvent`] per match. Client
//! transports plug in through [`ClientConnection`].

use crate::error::Result;
use async_trait::async_trait;
use log::{debug, trace};
use skyfeed_commons::{ClientId, FeedEvent, Message};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receives feeds for one live query.
///
/// Must not block; failures belong to the transport and are not reported
/// back to the dispatcher.
pub trait FeedSink: Send + Sync {
    fn deliver(&self, feed: FeedEvent);
}

impl FeedSink for mpsc::UnboundedSender<FeedEvent> {
    fn deliver(&self, feed: FeedEvent) {
        if self.send(feed).is_err() {
            trace!("Feed receiver dropped, discarding feed");
        }
    }
}

/// Closure-backed sink
pub struct FnSink<F>(F);

impl<F> FnSink<F>
where
    F: Fn(FeedEvent) + Send + Sync + 'static,
{
    pub fn new(f: F) -> Arc<Self> {
        Arc::new(Self(f))
    }
}

impl<F> FeedSink for FnSink<F>
where
    F: Fn(FeedEvent) + Send + Sync,
{
    fn deliver(&self, feed: FeedEvent) {
        (self.0)(feed)
    }
}

/// Client transport (websocket, gRPC stream, ...).
///
/// `write` only enqueues; the transport drains its outbound queue to the
/// wire on its own task. `recv` yields inbound messages until the
/// connection ends.
#[async_trait]
pub trait ClientConnection: Send + Sync {
    fn client_id(&self) -> &ClientId;

    /// Queue `message` for the client
    fn write(&self, message: Message) -> Result<()>;

    /// Next inbound message, `None` once the connection is gone
    async fn recv(&self) -> Option<Message>;

    async fn close(&self);

    /// Cancelled when the client disconnects
    fn disconnected(&self) -> CancellationToken;
}

/// Sink writing `realtime-feed` messages to a client connection
pub struct ClientFeedSink {
    connection: Arc<dyn ClientConnection>,
}

impl ClientFeedSink {
    pub fn new(connection: Arc<dyn ClientConnection>) -> Arc<Self> {
        Arc::new(Self { connection })
    }
}

impl FeedSink for ClientFeedSink {
    fn deliver(&self, feed: FeedEvent) {
        let message = match Message::feed(&feed) {
            Ok(message) => message,
            Err(e) => {
                debug!("Failed to encode feed for doc {}: {}", feed.doc_id, e);
                return;
            },
        };

        if let Err(e) = self.connection.write(message) {
            debug!(
                "Failed to write feed to client {}: {}",
                self.connection.client_id(),
                e
            );
        }
    }
}
