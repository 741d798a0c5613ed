//! Bus topic naming.
//!
//! Every group-scoped topic carries project, database type and collection so
//! that intent/ack envelopes and group subscriptions always agree on the name.

use crate::models::DbType;

/// Cluster-wide topic carrying database events for function triggers.
pub const TRIGGER_TOPIC: &str = "realtime:trigger";

/// Requests to run a function trigger; answered with a `TriggerAck` once the
/// cluster quorum is reached or has failed.
pub const FUNCTION_CALL_TOPIC: &str = "realtime:function-call";

const GROUP_TOPIC_PREFIX: &str = "realtime";
const REPLY_TOPIC_PREFIX: &str = "realtime:reply";

/// Topic for feed envelopes of one collection: `realtime:<project>:<dbType>:<collection>`.
pub fn group_topic(project: &str, db_type: DbType, collection: &str) -> String {
    format!("{}:{}:{}:{}", GROUP_TOPIC_PREFIX, project, db_type, collection)
}

/// Reply subject for a single request, unique per `token`.
pub fn reply_topic(token: &str) -> String {
    format!("{}:{}", REPLY_TOPIC_PREFIX, token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_topic_includes_db_type() {
        assert_eq!(
            group_topic("todo-app", DbType::Mongo, "orders"),
            "realtime:todo-app:mongo:orders"
        );
    }

    #[test]
    fn test_reply_topic_is_distinct_from_trigger_topic() {
        let reply = reply_topic("abc");
        assert_eq!(reply, "realtime:reply:abc");
        assert_ne!(reply, TRIGGER_TOPIC);
        assert_ne!(reply, FUNCTION_CALL_TOPIC);
    }
}
