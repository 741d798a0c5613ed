//! Collaborators the engine depends on but does not implement.
//!
//! Storage, authorization and cluster membership live elsewhere; the engine
//! only talks to them through these traits.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use skyfeed_commons::DbType;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Cardinality of a storage read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOperation {
    One,
    All,
}

/// Query handed to the storage collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    pub find: JsonValue,
    pub operation: ReadOperation,
}

impl ReadRequest {
    pub fn all(find: JsonValue) -> Self {
        Self {
            find,
            operation: ReadOperation::All,
        }
    }

    pub fn one(find: JsonValue) -> Self {
        Self {
            find,
            operation: ReadOperation::One,
        }
    }
}

/// Read access to the storage layer.
///
/// `All` reads return a JSON array of rows; `One` reads return the single
/// matching document and fail with [`crate::RealtimeError::Storage`] when
/// nothing matches.
#[async_trait]
pub trait StorageReader: Send + Sync {
    async fn read(
        &self,
        project: &str,
        db_type: DbType,
        collection: &str,
        request: ReadRequest,
    ) -> Result<JsonValue>;
}

/// Operation checked against the authorization rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthOperation {
    Read,
    Create,
    Update,
    Delete,
}

impl AuthOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthOperation::Read => "read",
            AuthOperation::Create => "create",
            AuthOperation::Update => "update",
            AuthOperation::Delete => "delete",
        }
    }
}

/// Claims resolved from a client token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthContext {
    pub claims: JsonValue,
}

impl AuthContext {
    pub fn new(claims: JsonValue) -> Self {
        Self { claims }
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve `token`, failing with `Unauthenticated`
    async fn is_authenticated(
        &self,
        token: &str,
        db_type: DbType,
        collection: &str,
        operation: AuthOperation,
    ) -> Result<AuthContext>;

    /// Check the operation against the project's rules, failing with `Unauthorized`.
    ///
    /// `args` carries `{"auth": <claims>, "find": <filter>}`.
    async fn is_authorized(
        &self,
        project: &str,
        db_type: DbType,
        collection: &str,
        operation: AuthOperation,
        args: &JsonValue,
    ) -> Result<()>;
}

/// Source of the alive node count used for quorum acknowledgement
pub trait ClusterMembership: Send + Sync {
    fn alive_node_count(&self) -> usize;
}

/// Membership with a fixed, externally updated node count
#[derive(Debug)]
pub struct StaticMembership {
    alive: AtomicUsize,
}

impl StaticMembership {
    pub fn new(alive_nodes: usize) -> Self {
        Self {
            alive: AtomicUsize::new(alive_nodes),
        }
    }

    pub fn set_alive_nodes(&self, alive_nodes: usize) {
        self.alive.store(alive_nodes, Ordering::Release);
    }
}

impl ClusterMembership for StaticMembership {
    fn alive_node_count(&self) -> usize {
        self.alive.load(Ordering::Acquire)
    }
}
