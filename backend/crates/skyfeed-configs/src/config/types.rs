use super::defaults::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub node: NodeSettings,
    #[serde(default)]
    pub realtime: RealtimeSettings,
    #[serde(default)]
    pub cluster: ClusterSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Identity of this node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    /// Project whose collections this node serves
    #[serde(default = "default_project")]
    pub project: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            project: default_project(),
        }
    }
}

/// Realtime subsystem settings.
///
/// Applied at runtime through `RealtimeModule::set_config`; flipping
/// `enabled` starts or drains the dispatcher worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeSettings {
    #[serde(default = "default_realtime_enabled")]
    pub enabled: bool,
    /// Number of dispatcher workers draining the feed channel
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Bounded capacity of the feed channel; producers block when full
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Deadline for cluster-wide trigger acknowledgement
    #[serde(default = "default_quorum_timeout_secs")]
    pub quorum_timeout_secs: u64,
    /// Age after which an unacknowledged intent is resolved against storage
    #[serde(default = "default_pending_intent_ttl_secs")]
    pub pending_intent_ttl_secs: u64,
    #[serde(default = "default_pending_sweep_interval_secs")]
    pub pending_sweep_interval_secs: u64,
}

impl RealtimeSettings {
    pub fn enabled(worker_count: usize) -> Self {
        Self {
            enabled: true,
            worker_count,
            ..Default::default()
        }
    }

    pub fn quorum_timeout(&self) -> Duration {
        Duration::from_secs(self.quorum_timeout_secs)
    }

    pub fn pending_intent_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_intent_ttl_secs)
    }

    pub fn pending_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.pending_sweep_interval_secs)
    }
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            enabled: default_realtime_enabled(),
            worker_count: default_worker_count(),
            channel_capacity: default_channel_capacity(),
            quorum_timeout_secs: default_quorum_timeout_secs(),
            pending_intent_ttl_secs: default_pending_intent_ttl_secs(),
            pending_sweep_interval_secs: default_pending_sweep_interval_secs(),
        }
    }
}

/// Cluster membership as seen by this node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Alive node count used by the static membership provider
    #[serde(default = "default_alive_nodes")]
    pub alive_nodes: usize,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            alive_nodes: default_alive_nodes(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
    #[serde(default = "default_true")]
    pub log_to_console: bool,
    /// Per-target overrides, e.g. `skyfeed_realtime = "debug"`
    #[serde(default)]
    pub targets: HashMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            logs_path: default_logs_path(),
            log_to_console: true,
            targets: HashMap::new(),
        }
    }
}
