//! Core types for conversation subscriptions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque identifier of a conversation. Selects which channel to subscribe to.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        ConversationId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConversationId({})", self.0)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        ConversationId::new(s)
    }
}

/// Unique identifier of a message.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        MessageId(s.to_string())
    }
}

/// Milliseconds since the Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_millis() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A chat message as delivered by the realtime backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: String,
    pub content: String,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<Timestamp>,
}

impl Message {
    /// Create a new message stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        conversation_id: ConversationId,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId(id.into()),
            conversation_id,
            sender_id: sender_id.into(),
            content: content.into(),
            created_at: Timestamp::now(),
            edited_at: None,
        }
    }

    /// Set the creation time.
    pub fn at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }

    /// Ordering key used by the live message set.
    pub fn sort_key(&self) -> (Timestamp, &MessageId) {
        (self.created_at, &self.id)
    }
}

/// Row-level change delivered on a conversation channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "UPPERCASE")]
pub enum MessageEvent {
    Insert { message: Message },
    Update { message: Message },
    Delete { id: MessageId },
}

impl MessageEvent {
    /// Event kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            MessageEvent::Insert { .. } => "insert",
            MessageEvent::Update { .. } => "update",
            MessageEvent::Delete { .. } => "delete",
        }
    }

    /// Conversation this event belongs to, if the payload carries one.
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            MessageEvent::Insert { message } | MessageEvent::Update { message } => {
                Some(&message.conversation_id)
            }
            MessageEvent::Delete { .. } => None,
        }
    }
}

/// Channel status reported by the realtime backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    Subscribed,
    ChannelError(String),
    TimedOut,
    Closed,
}

impl ChannelStatus {
    /// True if the channel can no longer deliver events.
    pub fn is_drop(&self) -> bool {
        !matches!(self, ChannelStatus::Subscribed)
    }
}

/// Identifier assigned to a channel by the provider.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

/// Parameters of a channel subscription for one conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Channel topic, e.g. `messages:<conversation>`.
    pub topic: String,
    pub schema: String,
    pub table: String,
    /// Row filter, e.g. `conversation_id=eq.<conversation>`.
    pub filter: String,
    pub conversation_id: ConversationId,
}

/// Lifecycle of one conversation subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Subscribing,
    Subscribed,
    Dropped,
    CleanedUp,
}

impl LifecycleState {
    /// Whether `self -> next` is an edge of the lifecycle.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (CleanedUp, _) => false,
            (_, CleanedUp) => true,
            (Idle, Subscribing)
            | (Subscribing, Subscribed)
            | (Subscribing, Dropped)
            | (Subscribed, Dropped)
            | (Dropped, Subscribing) => true,
            // Conversation switches restart setup from any live state.
            (Subscribing, Subscribing) | (Subscribed, Subscribing) => true,
            _ => false,
        }
    }
}

/// Point-in-time view of a subscription lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleStatus {
    pub conversation_id: Option<ConversationId>,
    pub state: LifecycleState,
    pub attempts: u32,
    pub has_channel: bool,
    /// A drop left no reconnect timer because scheduling failed.
    #[serde(default)]
    pub reconnect_stalled: bool,
}

impl Default for LifecycleStatus {
    fn default() -> Self {
        Self {
            conversation_id: None,
            state: LifecycleState::Idle,
            attempts: 0,
            has_channel: false,
            reconnect_stalled: false,
        }
    }
}
