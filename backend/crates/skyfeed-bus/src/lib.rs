//! # skyfeed-bus
//!
//! The message bus the realtime engine publishes on and listens to:
//! - [`Bus`] trait with `publish`, `publish_request` and `subscribe`
//! - [`Subscription`] handles that tear the subscription down on `unsubscribe`
//! - [`InMemoryBus`] for single-process deployments and tests

pub mod bus;
pub mod error;
pub mod memory;

pub use bus::{handler_fn, Bus, BusMessage, MessageHandler, Subscription, SubscriptionId};
pub use error::{BusError, Result};
pub use memory::InMemoryBus;
