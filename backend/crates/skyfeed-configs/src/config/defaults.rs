// Default value functions

pub fn default_node_id() -> String {
    "node-1".to_string()
}

pub fn default_project() -> String {
    "default".to_string()
}

pub fn default_realtime_enabled() -> bool {
    false // Absent [realtime] section keeps the subsystem off
}

pub fn default_worker_count() -> usize {
    10
}

pub fn default_channel_capacity() -> usize {
    5
}

pub fn default_quorum_timeout_secs() -> u64 {
    10
}

pub fn default_pending_intent_ttl_secs() -> u64 {
    30
}

pub fn default_pending_sweep_interval_secs() -> u64 {
    120 // 2 minutes
}

pub fn default_alive_nodes() -> usize {
    1 // Standalone
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_log_format() -> String {
    "compact".to_string()
}

pub fn default_logs_path() -> String {
    "./logs".to_string()
}

pub fn default_true() -> bool {
    true
}
