//! skyfeed server library
//!
//! Wires configuration, the message bus and the storage/auth collaborators
//! into a running realtime node.

pub mod lifecycle;
pub mod logging;

pub use lifecycle::{bootstrap, prepare, static_membership, RealtimeNode};
pub use logging::{init_from_settings, node_subscriber};
