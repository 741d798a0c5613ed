//! Error types for skyfeed-bus

use thiserror::Error;

/// Errors raised by bus implementations
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Publish failed on '{subject}': {reason}")]
    Publish { subject: String, reason: String },

    #[error("Subscribe failed on '{subject}': {reason}")]
    Subscribe { subject: String, reason: String },

    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    #[error("Bus closed")]
    Closed,
}

/// Result type for bus operations
pub type Result<T> = std::result::Result<T, BusError>;
