//! In-process realtime backend.
//!
//! [`InMemoryRealtime`] implements both [`RealtimeProvider`] and
//! [`MessageFetcher`] on top of plain maps. Channels are routed by
//! conversation, history is kept per conversation, and failures can be
//! injected for subscribe, unsubscribe and fetch.

use crate::error::{RealtimeError, Result};
use crate::provider::{ChannelHandle, ChannelSink, MessageFetcher, RealtimeProvider};
use crate::types::{
    ChannelId, ChannelStatus, ConversationId, Message, MessageEvent, SubscribeRequest,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

struct LiveChannel {
    conversation: ConversationId,
    sink: ChannelSink,
}

#[derive(Default)]
struct Inner {
    next_channel: u64,
    channels: HashMap<ChannelId, LiveChannel>,
    history: HashMap<ConversationId, Vec<Message>>,
    failing_subscribes: u32,
    fail_unsubscribes: bool,
    fail_fetches: bool,
    gate: Option<Receiver<()>>,
}

impl Inner {
    fn sinks_for(&self, conversation_id: &ConversationId) -> Vec<ChannelSink> {
        self.channels
            .values()
            .filter(|c| &c.conversation == conversation_id)
            .map(|c| c.sink.clone())
            .collect()
    }

    fn record(&mut self, conversation_id: &ConversationId, event: &MessageEvent) {
        let history = self.history.entry(conversation_id.clone()).or_default();
        match event {
            MessageEvent::Insert { message } | MessageEvent::Update { message } => {
                match history.iter_mut().find(|m| m.id == message.id) {
                    Some(existing) => *existing = message.clone(),
                    None => history.push(message.clone()),
                }
            }
            MessageEvent::Delete { id } => history.retain(|m| &m.id != id),
        }
    }
}

/// Holds subscribe calls until released or dropped.
pub struct SubscribeGate {
    _release: Sender<()>,
}

impl SubscribeGate {
    /// Let every held and future subscribe call through.
    pub fn release(self) {}
}

/// Loopback realtime backend.
#[derive(Default)]
pub struct InMemoryRealtime {
    inner: Mutex<Inner>,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
}

impl InMemoryRealtime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored history of a conversation.
    pub fn seed(&self, conversation_id: &ConversationId, messages: Vec<Message>) {
        self.inner
            .lock()
            .history
            .insert(conversation_id.clone(), messages);
    }

    /// Apply a row change to the history and push it to every live channel
    /// of the conversation. Returns the number of channels reached.
    pub fn publish(&self, conversation_id: &ConversationId, event: MessageEvent) -> usize {
        let sinks = {
            let mut inner = self.inner.lock();
            inner.record(conversation_id, &event);
            inner.sinks_for(conversation_id)
        };

        sinks
            .iter()
            .filter(|sink| sink.deliver(event.clone()))
            .count()
    }

    /// Kill every channel of a conversation, reporting `status` to each.
    pub fn drop_channels(&self, conversation_id: &ConversationId, status: ChannelStatus) -> usize {
        let dropped: Vec<LiveChannel> = {
            let mut inner = self.inner.lock();
            let ids: Vec<ChannelId> = inner
                .channels
                .iter()
                .filter(|(_, c)| &c.conversation == conversation_id)
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| inner.channels.remove(id))
                .collect()
        };

        for channel in &dropped {
            channel.sink.report(status.clone());
        }
        dropped.len()
    }

    /// Reject the next `count` subscribe calls.
    pub fn fail_next_subscribes(&self, count: u32) {
        self.inner.lock().failing_subscribes = count;
    }

    pub fn fail_unsubscribes(&self, fail: bool) {
        self.inner.lock().fail_unsubscribes = fail;
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.inner.lock().fail_fetches = fail;
    }

    /// Hold subscribe calls until the returned gate is released. A held call
    /// has already opened its channel and reported `Subscribed`; it just has
    /// not returned the handle yet.
    pub fn pause_subscribes(&self) -> SubscribeGate {
        let (tx, rx) = bounded(0);
        self.inner.lock().gate = Some(rx);
        SubscribeGate { _release: tx }
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    pub fn active_channels(&self) -> usize {
        self.inner.lock().channels.len()
    }

    pub fn active_channels_for(&self, conversation_id: &ConversationId) -> usize {
        self.inner
            .lock()
            .channels
            .values()
            .filter(|c| &c.conversation == conversation_id)
            .count()
    }
}

impl RealtimeProvider for InMemoryRealtime {
    fn subscribe(&self, request: &SubscribeRequest, sink: ChannelSink) -> Result<ChannelHandle> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);

        let mut inner = self.inner.lock();
        if inner.failing_subscribes > 0 {
            inner.failing_subscribes -= 1;
            return Err(RealtimeError::Subscribe(format!(
                "channel {} rejected",
                request.topic
            )));
        }

        inner.next_channel += 1;
        let id = ChannelId(inner.next_channel);
        inner.channels.insert(
            id,
            LiveChannel {
                conversation: request.conversation_id.clone(),
                sink: sink.clone(),
            },
        );
        let gate = inner.gate.clone();
        drop(inner);

        sink.report(ChannelStatus::Subscribed);
        if let Some(gate) = gate {
            // Returns once the gate's sender is gone.
            let _ = gate.recv();
        }
        Ok(ChannelHandle::new(id, request.topic.clone()))
    }

    fn unsubscribe(&self, handle: &ChannelHandle) -> Result<()> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);

        let mut inner = self.inner.lock();
        if inner.fail_unsubscribes {
            return Err(RealtimeError::Cleanup(format!(
                "channel {:?} refused to close",
                handle.id()
            )));
        }
        match inner.channels.remove(&handle.id()) {
            Some(_) => Ok(()),
            None => Err(RealtimeError::Cleanup(format!(
                "channel {:?} is not open",
                handle.id()
            ))),
        }
    }
}

impl MessageFetcher for InMemoryRealtime {
    fn fetch_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        let inner = self.inner.lock();
        if inner.fail_fetches {
            return Err(RealtimeError::Fetch(format!(
                "history of {conversation_id} unavailable"
            )));
        }

        let mut messages = inner
            .history
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(messages)
    }
}
