//! Error types for skyfeed-realtime

use skyfeed_bus::BusError;
use thiserror::Error;

/// Errors raised by the realtime engine.
///
/// Only the subscribe pipeline surfaces these to clients, as a negative ack
/// carrying the display string.
#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Realtime module is disabled")]
    Disabled,
}

/// Result type for realtime operations
pub type Result<T> = std::result::Result<T, RealtimeError>;
