//! Feed dispatcher
//!
//! A pool of workers draining one bounded channel. Each event is fanned out
//! to the live queries of its group that accept it.
//!
//! Closing the channel is the only shutdown signal: `stop` drops the sender
//! and every worker exits once the buffered events are drained. A restart
//! allocates a fresh channel and a fresh pool.
//!
//! With more than one worker, two events of the same group may be delivered
//! out of submission order.
//!
//! Updates submitted without a payload are re-read by id before fan-out
//! when the dispatcher has a [`DocumentResolver`].

use crate::registry::SubscriptionRegistry;
use crate::resolver::DocumentResolver;
use log::{debug, info, trace};
use parking_lot::Mutex;
use skyfeed_commons::FeedEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Default)]
struct DispatcherState {
    sender: Option<mpsc::Sender<FeedEvent>>,
    workers: Vec<JoinHandle<()>>,
}

pub struct FeedDispatcher {
    registry: Arc<SubscriptionRegistry>,
    resolver: Option<Arc<DocumentResolver>>,
    state: Mutex<DispatcherState>,
}

impl FeedDispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            registry,
            resolver: None,
            state: Mutex::new(DispatcherState::default()),
        }
    }

    pub fn with_resolver(
        registry: Arc<SubscriptionRegistry>,
        resolver: Arc<DocumentResolver>,
    ) -> Self {
        Self {
            resolver: Some(resolver),
            ..Self::new(registry)
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().sender.is_some()
    }

    /// Start `worker_count` workers over a new channel of `capacity`.
    ///
    /// Returns `false` if the dispatcher is already running.
    pub fn start(&self, worker_count: usize, capacity: usize) -> bool {
        let mut state = self.state.lock();
        if state.sender.is_some() {
            return false;
        }

        let (tx, rx) = mpsc::channel::<FeedEvent>(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(rx));

        state.workers = (0..worker_count.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let registry = Arc::clone(&self.registry);
                let resolver = self.resolver.clone();
                tokio::spawn(async move {
                    Self::run_worker(worker, receiver, registry, resolver).await;
                })
            })
            .collect();
        state.sender = Some(tx);

        info!(
            "Feed dispatcher started ({} workers, capacity {})",
            state.workers.len(),
            capacity.max(1)
        );
        true
    }

    /// Close the channel and wait for every worker to drain and exit
    pub async fn stop(&self) {
        let workers = {
            let mut state = self.state.lock();
            if state.sender.take().is_none() {
                return;
            }
            std::mem::take(&mut state.workers)
        };

        for worker in workers {
            if let Err(e) = worker.await {
                debug!("Dispatcher worker ended abnormally: {}", e);
            }
        }
        info!("Feed dispatcher stopped");
    }

    /// Queue `event` for dispatch.
    ///
    /// Waits while the channel is full. When the dispatcher is not running
    /// the event is dropped and `false` is returned.
    pub async fn submit(&self, event: FeedEvent) -> bool {
        let sender = self.state.lock().sender.clone();
        let Some(sender) = sender else {
            trace!("Dispatcher not running, dropping feed for group '{}'", event.group);
            return false;
        };

        if sender.send(event).await.is_err() {
            trace!("Dispatcher channel closed while submitting");
            return false;
        }
        true
    }

    /// Deliver `event` to every accepting live query of its group.
    ///
    /// Returns the number of deliveries.
    pub fn dispatch(registry: &SubscriptionRegistry, event: &FeedEvent) -> usize {
        let _span = tracing::trace_span!(
            "dispatch_feed",
            group = %event.group,
            change = %event.change_type
        )
        .entered();

        let mut delivered = 0;
        registry.for_each_in_group(&event.group, |live_query| {
            if live_query.accepts(event) {
                live_query.deliver(event);
                delivered += 1;
            }
        });

        trace!(
            "Dispatched {} feed for doc {} to {} live queries",
            event.change_type,
            event.doc_id,
            delivered
        );
        delivered
    }

    async fn run_worker(
        worker: usize,
        receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<FeedEvent>>>,
        registry: Arc<SubscriptionRegistry>,
        resolver: Option<Arc<DocumentResolver>>,
    ) {
        loop {
            let next = {
                let mut rx = receiver.lock().await;
                rx.recv().await
            };

            match next {
                Some(event) => {
                    let event = match &resolver {
                        Some(resolver) => resolver.hydrate(event).await,
                        None => event,
                    };
                    Self::dispatch(&registry, &event);
                },
                None => break,
            }
        }
        trace!("Dispatcher worker {} exited", worker);
    }
}
