//! Change feed types.

use crate::types::{ConversationId, LifecycleState, Message, MessageId};
use serde::{Deserialize, Serialize};

/// Configuration for a feed subscription.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Max buffered events before dropping the subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: FeedFilter,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: FeedFilter::all(),
        }
    }
}

/// Filter criteria for feed subscriptions.
#[derive(Clone, Debug, Default)]
pub struct FeedFilter {
    /// Include message inserts, updates, deletes and snapshots.
    pub include_messages: bool,

    /// Include state transitions and reconnect scheduling.
    pub include_lifecycle: bool,
}

impl FeedFilter {
    /// Message changes only.
    pub fn messages() -> Self {
        Self {
            include_messages: true,
            ..Default::default()
        }
    }

    /// Lifecycle events only.
    pub fn lifecycle() -> Self {
        Self {
            include_lifecycle: true,
            ..Default::default()
        }
    }

    /// Subscribe to everything.
    pub fn all() -> Self {
        Self {
            include_messages: true,
            include_lifecycle: true,
        }
    }
}

/// Events emitted to feed subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    // --- Message Events ---
    MessageInserted {
        message: Message,
    },

    MessageUpdated {
        message: Message,
    },

    MessageDeleted {
        id: MessageId,
    },

    /// The live set was replaced by a fetched snapshot.
    Snapshot {
        conversation_id: ConversationId,
        count: usize,
    },

    // --- Lifecycle Events ---
    StateChanged {
        conversation_id: Option<ConversationId>,
        state: LifecycleState,
    },

    /// A reconnect was scheduled; the UI may show a "reconnecting" hint.
    ReconnectScheduled {
        conversation_id: Option<ConversationId>,
        attempt: u32,
        delay_ms: u64,
    },

    /// A reconnect could not be scheduled; nothing will retry until the
    /// next loop event or a new start.
    ReconnectStalled {
        conversation_id: Option<ConversationId>,
        attempt: u32,
        reason: String,
    },

    /// This feed subscription was dropped.
    Dropped {
        reason: DropReason,
    },
}

impl FeedEvent {
    pub fn is_message_event(&self) -> bool {
        matches!(
            self,
            FeedEvent::MessageInserted { .. }
                | FeedEvent::MessageUpdated { .. }
                | FeedEvent::MessageDeleted { .. }
                | FeedEvent::Snapshot { .. }
        )
    }
}

/// Why a feed subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a feed subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FeedId(pub u64);

/// Receiving end of a feed subscription.
pub struct FeedHandle {
    pub id: FeedId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<FeedEvent>,
}

impl FeedHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<FeedEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<FeedEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<FeedEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
