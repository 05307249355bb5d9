//! Collaborator traits: the realtime backend, the message query, and the
//! handlers that receive row changes.

use crate::error::Result;
use crate::lifecycle::{ChannelEvent, LoopEvent};
use crate::types::{
    ChannelId, ChannelStatus, ConversationId, Message, MessageEvent, MessageId, SubscribeRequest,
};
use crossbeam_channel::Sender;

/// A live channel subscription. Held exclusively by the lifecycle manager
/// and replaced, never mutated, on reconnect.
#[derive(Debug, PartialEq, Eq)]
pub struct ChannelHandle {
    id: ChannelId,
    topic: String,
}

impl ChannelHandle {
    pub fn new(id: ChannelId, topic: impl Into<String>) -> Self {
        Self {
            id,
            topic: topic.into(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Where a provider pushes events for one channel.
///
/// Every sink is tagged with the setup generation that created it, so events
/// from a superseded channel are recognised and ignored by the manager.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    generation: u64,
    inbox: Sender<LoopEvent>,
}

impl ChannelSink {
    pub fn new(generation: u64, inbox: Sender<LoopEvent>) -> Self {
        Self { generation, inbox }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Push a row change. Returns false once the loop has stopped.
    pub fn deliver(&self, event: MessageEvent) -> bool {
        self.send(ChannelEvent::Message(event))
    }

    /// Push a status change. Returns false once the loop has stopped.
    pub fn report(&self, status: ChannelStatus) -> bool {
        self.send(ChannelEvent::Status(status))
    }

    fn send(&self, event: ChannelEvent) -> bool {
        self.inbox
            .send(LoopEvent::Channel {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Subscribe/unsubscribe primitive of the hosted realtime backend.
///
/// `subscribe` may block until the backend confirms the channel; it is never
/// called on the event loop thread.
pub trait RealtimeProvider: Send + Sync {
    fn subscribe(&self, request: &SubscribeRequest, sink: ChannelSink) -> Result<ChannelHandle>;

    fn unsubscribe(&self, handle: &ChannelHandle) -> Result<()>;
}

/// Initial population of a conversation.
pub trait MessageFetcher: Send + Sync {
    /// Messages of the conversation in display order.
    fn fetch_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>>;
}

/// Receivers of row changes. Failures are logged by the manager and never
/// tear down the channel.
pub trait MessageHandlers: Send + Sync {
    fn on_insert(&self, message: Message) -> Result<()>;

    fn on_update(&self, message: Message) -> Result<()>;

    fn on_delete(&self, id: &MessageId) -> Result<()>;

    /// Called with the fetched messages after each successful subscribe.
    fn on_initial(&self, _conversation_id: &ConversationId, _messages: Vec<Message>) -> Result<()> {
        Ok(())
    }

    /// Called when the conversation changes, before the new channel is set up.
    fn on_reset(&self, _conversation_id: &ConversationId) {}
}

/// Route a row change to the matching handler.
pub(crate) fn dispatch(handlers: &dyn MessageHandlers, event: MessageEvent) -> Result<()> {
    match event {
        MessageEvent::Insert { message } => handlers.on_insert(message),
        MessageEvent::Update { message } => handlers.on_update(message),
        MessageEvent::Delete { id } => handlers.on_delete(&id),
    }
}
