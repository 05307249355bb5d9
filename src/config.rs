//! Subscription configuration.

use crate::backoff::BackoffPolicy;
use crate::error::{RealtimeError, Result};
use crate::types::{ConversationId, SubscribeRequest};
use serde::{Deserialize, Serialize};

/// Lifecycle configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Reconnect delay schedule.
    pub backoff: BackoffPolicy,

    /// Topic prefix; the topic is `<prefix>:<conversation>`.
    pub channel_prefix: String,

    /// Database schema the message table lives in.
    pub schema: String,

    /// Message table name.
    pub table: String,

    /// Column the row filter matches the conversation against.
    pub filter_column: String,

    /// Max buffered events per feed subscriber before it is dropped.
    /// Default: 1000
    pub feed_buffer_size: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            channel_prefix: "messages".to_string(),
            schema: "public".to_string(),
            table: "messages".to_string(),
            filter_column: "conversation_id".to_string(),
            feed_buffer_size: 1000,
        }
    }
}

impl LifecycleConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.backoff.validate()?;
        if self.channel_prefix.is_empty() {
            return Err(RealtimeError::InvalidConfig(
                "channel_prefix must not be empty".to_string(),
            ));
        }
        if self.table.is_empty() || self.filter_column.is_empty() {
            return Err(RealtimeError::InvalidConfig(
                "table and filter_column must not be empty".to_string(),
            ));
        }
        if self.feed_buffer_size == 0 {
            return Err(RealtimeError::InvalidConfig(
                "feed_buffer_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the channel request for a conversation.
    pub fn subscribe_request(&self, conversation_id: &ConversationId) -> SubscribeRequest {
        SubscribeRequest {
            topic: format!("{}:{}", self.channel_prefix, conversation_id),
            schema: self.schema.clone(),
            table: self.table.clone(),
            filter: format!("{}=eq.{}", self.filter_column, conversation_id),
            conversation_id: conversation_id.clone(),
        }
    }
}
