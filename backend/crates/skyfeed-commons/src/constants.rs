//! Message types and event names used on the client wire and the bus.

/// Request type for a live query subscription
pub const TYPE_REALTIME_SUBSCRIBE: &str = "realtime-subscribe";

/// Request type for removing a live query subscription
pub const TYPE_REALTIME_UNSUBSCRIBE: &str = "realtime-unsubscribe";

/// Message type used when pushing a feed to a client
pub const TYPE_REALTIME_FEED: &str = "realtime-feed";

/// Database event fired for create requests
pub const EVENT_DB_INSERT: &str = "DB_INSERT";

/// Database event fired for update requests
pub const EVENT_DB_UPDATE: &str = "DB_UPDATE";

/// Database event fired for delete requests
pub const EVENT_DB_DELETE: &str = "DB_DELETE";

/// Reserved filter key for any-of semantics
pub const FILTER_OR: &str = "$or";
