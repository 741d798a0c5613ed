//! Live query registry
//!
//! Two-level index `group → client → query → LiveQuery`.
//!
//! Groups are sharded through a DashMap and each group owns its own
//! `RwLock`, so dispatch over one group never contends with subscribe or
//! unsubscribe traffic on another. Group entries are created lazily and
//! never removed; an empty group costs one small allocation.

use crate::filter;
use crate::sink::FeedSink;
use dashmap::DashMap;
use log::debug;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use skyfeed_commons::{ClientId, FeedEvent, QueryId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A client's standing subscription on a group
pub struct LiveQuery {
    pub id: QueryId,
    pub group: String,
    pub client_id: ClientId,
    pub filter: JsonValue,
    sink: Arc<dyn FeedSink>,
}

impl LiveQuery {
    pub fn new(
        id: QueryId,
        group: impl Into<String>,
        client_id: ClientId,
        filter: JsonValue,
        sink: Arc<dyn FeedSink>,
    ) -> Self {
        Self {
            id,
            group: group.into(),
            client_id,
            filter,
            sink,
        }
    }

    /// Whether `feed` should reach this subscription.
    ///
    /// Deletes bypass the filter: there is no post-delete payload to test.
    pub fn accepts(&self, feed: &FeedEvent) -> bool {
        if feed.is_delete() {
            return true;
        }
        match &feed.payload {
            Some(payload) => filter::matches(&self.filter, payload),
            None => false,
        }
    }

    /// Push `feed`, addressed to this query, to the owning client
    pub fn deliver(&self, feed: &FeedEvent) {
        self.sink.deliver(feed.for_query(&self.id));
    }
}

impl fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveQuery")
            .field("id", &self.id)
            .field("group", &self.group)
            .field("client_id", &self.client_id)
            .field("filter", &self.filter)
            .finish()
    }
}

type ClientQueries = HashMap<ClientId, HashMap<QueryId, Arc<LiveQuery>>>;
type SharedGroup = Arc<RwLock<ClientQueries>>;

#[derive(Default)]
pub struct SubscriptionRegistry {
    groups: DashMap<String, SharedGroup>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self, group: &str) -> Option<SharedGroup> {
        self.groups.get(group).map(|entry| Arc::clone(entry.value()))
    }

    fn group_or_create(&self, group: &str) -> SharedGroup {
        if let Some(existing) = self.group(group) {
            return existing;
        }
        Arc::clone(self.groups.entry(group.to_string()).or_default().value())
    }

    /// Register a live query, replacing any previous one with the same
    /// `(group, client_id, id)`. Returns `true` if it replaced an entry.
    pub fn add_live_query(
        &self,
        id: QueryId,
        group: &str,
        client_id: ClientId,
        filter: JsonValue,
        sink: Arc<dyn FeedSink>,
    ) -> bool {
        let live_query = Arc::new(LiveQuery::new(id.clone(), group, client_id.clone(), filter, sink));
        let shared = self.group_or_create(group);
        let replaced = shared
            .write()
            .entry(client_id)
            .or_default()
            .insert(id, live_query)
            .is_some();

        if replaced {
            debug!("Replaced live query on group '{}'", group);
        }
        replaced
    }

    /// Remove one live query; absent entries are ignored
    pub fn remove_live_query(&self, group: &str, client_id: &ClientId, id: &QueryId) -> bool {
        let Some(shared) = self.group(group) else {
            return false;
        };

        let mut clients = shared.write();
        let Some(queries) = clients.get_mut(client_id) else {
            return false;
        };
        let removed = queries.remove(id).is_some();
        if queries.is_empty() {
            clients.remove(client_id);
        }
        removed
    }

    /// Remove every live query of `client_id` across all groups.
    ///
    /// Returns the number of live queries removed.
    pub fn remove_client(&self, client_id: &ClientId) -> usize {
        let groups: Vec<SharedGroup> = self
            .groups
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let removed: usize = groups
            .iter()
            .filter_map(|shared| shared.write().remove(client_id))
            .map(|queries| queries.len())
            .sum();

        if removed > 0 {
            debug!("Removed {} live queries of client {}", removed, client_id);
        }
        removed
    }

    /// Snapshot of the live queries in `group`
    pub fn snapshot(&self, group: &str) -> Vec<Arc<LiveQuery>> {
        let Some(shared) = self.group(group) else {
            return Vec::new();
        };
        let clients = shared.read();
        clients.values().flat_map(|queries| queries.values().cloned()).collect()
    }

    /// Visit every live query of `group`.
    ///
    /// Iterates a snapshot taken under the group's read lock; `f` runs with
    /// no lock held, so it may add or remove subscriptions.
    pub fn for_each_in_group<F>(&self, group: &str, mut f: F)
    where
        F: FnMut(&Arc<LiveQuery>),
    {
        for live_query in self.snapshot(group) {
            f(&live_query);
        }
    }

    pub fn contains(&self, group: &str, client_id: &ClientId, id: &QueryId) -> bool {
        self.group(group)
            .map(|shared| {
                shared
                    .read()
                    .get(client_id)
                    .is_some_and(|queries| queries.contains_key(id))
            })
            .unwrap_or(false)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn group_query_count(&self, group: &str) -> usize {
        self.group(group)
            .map(|shared| shared.read().values().map(HashMap::len).sum())
            .unwrap_or(0)
    }

    pub fn total_queries(&self) -> usize {
        self.groups
            .iter()
            .map(|entry| entry.value().read().values().map(HashMap::len).sum::<usize>())
            .sum()
    }
}
