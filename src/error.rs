//! Error types for the realtime subscription lifecycle.

use crate::types::ConversationId;
use thiserror::Error;

/// Main error type for subscription operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The provider rejected or timed out establishing a channel.
    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    /// A handler failed while processing an event.
    #[error("Delivery of {event} failed: {reason}")]
    Delivery { event: &'static str, reason: String },

    /// The provider failed to release a channel.
    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    #[error("Fetching messages failed: {0}")]
    Fetch(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Conversation mismatch: expected {expected}, got {got}")]
    ConversationMismatch {
        expected: ConversationId,
        got: ConversationId,
    },

    #[error("Subscription loop is not running")]
    LoopStopped,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RealtimeError {
    /// Build a delivery error for the given event kind.
    pub fn delivery(event: &'static str, reason: impl Into<String>) -> Self {
        RealtimeError::Delivery {
            event,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(e: serde_json::Error) -> Self {
        RealtimeError::Serialization(e.to_string())
    }
}

/// Result type for subscription operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;
