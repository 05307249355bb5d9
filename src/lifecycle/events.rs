//! Events consumed by the lifecycle event loop.

use crate::error::Result;
use crate::provider::ChannelHandle;
use crate::types::{ChannelStatus, ConversationId, MessageEvent};

/// Something a provider pushed into a channel sink.
#[derive(Debug)]
pub enum ChannelEvent {
    Message(MessageEvent),
    Status(ChannelStatus),
}

/// Input of [`SubscriptionLifecycleManager::handle`].
///
/// [`SubscriptionLifecycleManager::handle`]: super::SubscriptionLifecycleManager::handle
#[derive(Debug)]
pub enum LoopEvent {
    /// Subscribe to a conversation, switching away from the current one.
    Start(ConversationId),

    /// A provider `subscribe` call returned.
    SetupResolved {
        generation: u64,
        result: Result<ChannelHandle>,
    },

    /// A channel delivered an event.
    Channel {
        generation: u64,
        event: ChannelEvent,
    },

    /// A reconnect timer expired.
    ReconnectDue { timer_id: u64 },

    /// Tear everything down and stop the loop.
    Cleanup,
}
