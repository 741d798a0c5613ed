//! skyfeed-configs
//!
//! Server configuration types and loader for skyfeed.

pub mod config;

pub use config::defaults;
pub use config::*;
