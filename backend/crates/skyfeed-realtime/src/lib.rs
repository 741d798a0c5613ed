//! # skyfeed-realtime
//!
//! Realtime change notification engine.
//!
//! Clients subscribe to a collection ("group") with an optional filter; the
//! engine fans document write/update/delete events out to every matching
//! live query. Pieces, leaves first:
//!
//! - [`filter`]: document filter interpreter
//! - [`registry`]: group → client → query subscription map
//! - [`dispatcher`]: bounded worker pool delivering feeds
//! - [`broadcaster`]: intent/ack envelopes for mutations
//! - [`resolver`]: re-reads documents for payload-less updates
//! - [`pending`]: subscriber side of intent/ack, with stale sweeping
//! - [`trigger`]: cluster trigger topic and N-of-N quorum acknowledgement
//! - [`module`] and [`session`]: lifecycle, subscribe pipeline and client I/O

pub mod broadcaster;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod module;
pub mod pending;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod sink;
pub mod traits;
pub mod trigger;

pub use broadcaster::{IntentBroadcaster, MutationIntent};
pub use dispatcher::FeedDispatcher;
pub use error::{RealtimeError, Result};
pub use filter::matches;
pub use module::RealtimeModule;
pub use pending::PendingIntents;
pub use registry::{LiveQuery, SubscriptionRegistry};
pub use resolver::DocumentResolver;
pub use session::{serve_client, RealtimeSession};
pub use sink::{ClientConnection, ClientFeedSink, FeedSink, FnSink};
pub use traits::{
    AuthContext, AuthOperation, Authenticator, ClusterMembership, ReadOperation, ReadRequest,
    StaticMembership, StorageReader,
};
pub use trigger::{TriggerCoordinator, TriggerOutcome};
