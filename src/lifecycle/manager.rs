//! Subscription lifecycle manager for one conversation at a time.

use crate::config::LifecycleConfig;
use crate::error::{RealtimeError, Result};
use crate::feed::{FeedEvent, FeedManager};
use crate::provider::{
    dispatch, ChannelHandle, ChannelSink, MessageFetcher, MessageHandlers, RealtimeProvider,
};
use crate::timer::Scheduler;
use crate::types::{ConversationId, LifecycleState, LifecycleStatus};
use crossbeam_channel::Sender;
use parking_lot::RwLock;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::events::{ChannelEvent, LoopEvent};
use super::state::ReconnectState;

/// Collaborators of the lifecycle manager.
#[derive(Clone)]
pub struct LifecycleDeps {
    pub provider: Arc<dyn RealtimeProvider>,
    pub fetcher: Arc<dyn MessageFetcher>,
    pub handlers: Arc<dyn MessageHandlers>,
    pub scheduler: Arc<dyn Scheduler>,
    pub feed: Arc<FeedManager>,
}

/// The channel currently held, tagged with the setup that produced it.
struct ActiveChannel {
    generation: u64,
    handle: ChannelHandle,
}

/// Owns the realtime channel of one conversation.
///
/// All methods run on a single event-loop thread; provider calls and timer
/// waits happen elsewhere and come back as [`LoopEvent`]s through `inbox`.
///
/// Invariants:
/// - at most one channel is held, and at most one setup is in flight
/// - at most one reconnect timer is pending
/// - once cleaned up, nothing is subscribed or scheduled again
pub struct SubscriptionLifecycleManager {
    config: LifecycleConfig,
    deps: LifecycleDeps,
    inbox: Sender<LoopEvent>,

    conversation: Option<ConversationId>,
    channel: Option<ActiveChannel>,
    /// Generation of the setup whose result is still outstanding.
    pending_setup: Option<u64>,
    /// Pending setup whose channel reported a drop before it resolved.
    pending_drop: Option<u64>,
    /// Bumped by every setup; events and results from older ones are stale.
    generation: u64,
    next_timer_id: u64,

    state: LifecycleState,
    reconnect: ReconnectState,
    /// The last reconnect could not be scheduled.
    reconnect_stalled: bool,
    status: Arc<RwLock<LifecycleStatus>>,
}

impl SubscriptionLifecycleManager {
    pub fn new(config: LifecycleConfig, deps: LifecycleDeps, inbox: Sender<LoopEvent>) -> Self {
        Self {
            config,
            deps,
            inbox,
            conversation: None,
            channel: None,
            pending_setup: None,
            pending_drop: None,
            generation: 0,
            next_timer_id: 0,
            state: LifecycleState::Idle,
            reconnect: ReconnectState::new(),
            reconnect_stalled: false,
            status: Arc::new(RwLock::new(LifecycleStatus::default())),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.reconnect.attempts()
    }

    pub fn conversation(&self) -> Option<&ConversationId> {
        self.conversation.as_ref()
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    pub fn has_pending_setup(&self) -> bool {
        self.pending_setup.is_some()
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.reconnect.is_cleaned_up()
    }

    /// True when a drop left no channel and the reconnect timer could not be
    /// scheduled. Retried on the next loop event; `start` also recovers.
    pub fn is_reconnect_stalled(&self) -> bool {
        self.reconnect_stalled
    }

    /// Id of the pending reconnect timer, if any.
    pub fn pending_reconnect(&self) -> Option<u64> {
        self.reconnect.pending_timer()
    }

    pub fn status(&self) -> LifecycleStatus {
        self.status.read().clone()
    }

    /// Shared status cell, updated on every transition.
    pub fn status_cell(&self) -> Arc<RwLock<LifecycleStatus>> {
        Arc::clone(&self.status)
    }

    /// Process one loop event. Breaks once the manager is cleaned up.
    pub fn handle(&mut self, event: LoopEvent) -> ControlFlow<()> {
        let stalled = self.reconnect_stalled;
        match event {
            LoopEvent::Start(conversation_id) => self.start(conversation_id),
            LoopEvent::SetupResolved { generation, result } => {
                self.on_setup_resolved(generation, result)
            }
            LoopEvent::Channel { generation, event } => self.on_channel_event(generation, event),
            LoopEvent::ReconnectDue { timer_id } => self.on_reconnect_due(timer_id),
            LoopEvent::Cleanup => self.cleanup(),
        }

        if stalled && self.reconnect_stalled && self.awaiting_reconnect() {
            tracing::debug!("retrying stalled reconnect");
            self.schedule_reconnect();
        }

        if self.reconnect.is_cleaned_up() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Subscribe to `conversation_id`, first invalidating everything that
    /// belongs to the current conversation.
    ///
    /// This is the conversation-change trigger. It is independent of the
    /// reconnect counter, which only drop events advance.
    pub fn start(&mut self, conversation_id: ConversationId) {
        if self.reconnect.is_cleaned_up() {
            tracing::warn!(conversation_id = %conversation_id, "ignoring start after cleanup");
            return;
        }

        let same = self.conversation.as_ref() == Some(&conversation_id);
        let live = self.channel.is_some()
            || self.pending_setup.is_some()
            || self.reconnect.pending_timer().is_some();
        if same && live {
            tracing::debug!(conversation_id = %conversation_id, "conversation already active");
            return;
        }

        self.reconnect.clear_timer();
        self.release_channel();
        self.pending_setup = None;
        self.pending_drop = None;
        self.reconnect.reset();
        self.reconnect_stalled = false;

        if !same {
            if let Some(previous) = &self.conversation {
                tracing::info!(
                    from = %previous,
                    to = %conversation_id,
                    "switching conversation"
                );
            }
            self.deps.handlers.on_reset(&conversation_id);
        }

        self.setup_channel(conversation_id);
    }

    /// Request a new channel for `conversation_id`.
    ///
    /// The provider call runs on a helper thread and its outcome arrives as
    /// [`LoopEvent::SetupResolved`]. A held channel is not released here; the
    /// caller does that before setting up again.
    pub fn setup_channel(&mut self, conversation_id: ConversationId) {
        if self.reconnect.is_cleaned_up() {
            tracing::debug!(conversation_id = %conversation_id, "skipping setup after cleanup");
            return;
        }
        if let Some(stale) = &self.channel {
            tracing::warn!(
                channel = ?stale.handle.id(),
                "setting up a channel while another is still held"
            );
        }

        self.generation += 1;
        let generation = self.generation;
        self.pending_setup = Some(generation);
        self.pending_drop = None;
        self.conversation = Some(conversation_id.clone());
        self.transition(LifecycleState::Subscribing);

        let request = self.config.subscribe_request(&conversation_id);
        let sink = ChannelSink::new(generation, self.inbox.clone());
        let provider = Arc::clone(&self.deps.provider);
        let inbox = self.inbox.clone();

        tracing::debug!(
            conversation_id = %conversation_id,
            topic = %request.topic,
            generation,
            "subscribing to channel"
        );

        let spawned = thread::Builder::new()
            .name("chat-realtime-setup".to_string())
            .spawn(move || {
                let result = provider.subscribe(&request, sink);
                if let Err(unsent) = inbox.send(LoopEvent::SetupResolved { generation, result }) {
                    // The loop is gone; nobody will ever own this channel.
                    if let LoopEvent::SetupResolved {
                        result: Ok(handle), ..
                    } = unsent.into_inner()
                    {
                        if let Err(err) = provider.unsubscribe(&handle) {
                            tracing::warn!(error = %err, "releasing orphaned channel failed");
                        }
                    }
                }
            });

        if let Err(err) = spawned {
            self.on_setup_resolved(generation, Err(RealtimeError::Io(err)));
        }
    }

    /// Schedule the next reconnect attempt, replacing any pending one.
    ///
    /// Returns the delay, or `None` after cleanup or if the scheduler failed.
    pub fn schedule_reconnect(&mut self) -> Option<Duration> {
        if self.reconnect.is_cleaned_up() {
            tracing::debug!("not scheduling reconnect after cleanup");
            return None;
        }

        let attempt = self.reconnect.next_attempt();
        let delay = self.config.backoff.delay_for_attempt(attempt);
        self.reconnect.clear_timer();
        self.reconnect_stalled = false;

        self.next_timer_id += 1;
        let timer_id = self.next_timer_id;
        let inbox = self.inbox.clone();
        let task = Box::new(move || {
            let _ = inbox.send(LoopEvent::ReconnectDue { timer_id });
        });

        match self.deps.scheduler.schedule(delay, task) {
            Ok(handle) => self.reconnect.replace_timer(timer_id, handle),
            Err(err) => {
                tracing::error!(attempt, error = %err, "failed to schedule reconnect");
                self.reconnect.undo_attempt();
                self.reconnect_stalled = true;
                self.sync_status();
                self.deps.feed.publish(FeedEvent::ReconnectStalled {
                    conversation_id: self.conversation.clone(),
                    attempt,
                    reason: err.to_string(),
                });
                return None;
            }
        }

        let delay_ms = delay.as_millis() as u64;
        tracing::info!(
            conversation_id = ?self.conversation,
            attempt,
            delay_ms,
            "reconnect scheduled"
        );
        self.sync_status();
        self.deps.feed.publish(FeedEvent::ReconnectScheduled {
            conversation_id: self.conversation.clone(),
            attempt,
            delay_ms,
        });

        Some(delay)
    }

    /// Tear down: cancel the pending timer, release the held channel, mark
    /// cleaned up. Later calls are no-ops.
    pub fn cleanup(&mut self) {
        if !self.reconnect.mark_cleaned_up() {
            tracing::debug!("cleanup already performed");
            return;
        }

        self.release_channel();
        self.pending_setup = None;
        self.pending_drop = None;
        self.reconnect_stalled = false;
        self.transition(LifecycleState::CleanedUp);
        tracing::info!(conversation_id = ?self.conversation, "subscription cleaned up");
    }

    fn on_setup_resolved(&mut self, generation: u64, result: Result<ChannelHandle>) {
        let current =
            !self.reconnect.is_cleaned_up() && self.pending_setup == Some(generation);
        if !current {
            if let Ok(handle) = result {
                tracing::debug!(
                    generation,
                    channel = ?handle.id(),
                    "releasing channel from superseded setup"
                );
                self.unsubscribe(&handle);
            }
            return;
        }

        self.pending_setup = None;
        let dropped_early = self.pending_drop.take() == Some(generation);
        match result {
            Ok(handle) if dropped_early => {
                tracing::warn!(
                    conversation_id = ?self.conversation,
                    channel = ?handle.id(),
                    "channel dropped during setup"
                );
                self.unsubscribe(&handle);
                self.transition(LifecycleState::Dropped);
                self.schedule_reconnect();
            }
            Ok(handle) => self.store_channel(generation, handle),
            Err(err) => {
                tracing::warn!(
                    conversation_id = ?self.conversation,
                    error = %err,
                    "channel subscription failed"
                );
                self.transition(LifecycleState::Dropped);
                self.schedule_reconnect();
            }
        }
    }

    fn store_channel(&mut self, generation: u64, handle: ChannelHandle) {
        self.reconnect.reset();
        tracing::info!(
            conversation_id = ?self.conversation,
            channel = ?handle.id(),
            topic = handle.topic(),
            "channel subscribed"
        );
        self.channel = Some(ActiveChannel { generation, handle });
        self.transition(LifecycleState::Subscribed);
        self.load_initial();
    }

    fn load_initial(&self) {
        let Some(conversation_id) = &self.conversation else {
            return;
        };

        match self.deps.fetcher.fetch_messages(conversation_id) {
            Ok(messages) => {
                let count = messages.len();
                if let Err(err) = self.deps.handlers.on_initial(conversation_id, messages) {
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        error = %err,
                        "initial population failed"
                    );
                } else {
                    tracing::debug!(conversation_id = %conversation_id, count, "loaded messages");
                }
            }
            Err(err) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %err,
                    "fetching messages failed"
                );
            }
        }
    }

    fn on_channel_event(&mut self, generation: u64, event: ChannelEvent) {
        if self.reconnect.is_cleaned_up() {
            return;
        }

        let held = self.channel.as_ref().map(|c| c.generation) == Some(generation);
        let pending = self.pending_setup == Some(generation);
        if !held && !pending {
            tracing::debug!(generation, "ignoring event from stale channel");
            return;
        }

        match event {
            ChannelEvent::Message(message) => {
                let kind = message.kind();
                if let Err(err) = dispatch(self.deps.handlers.as_ref(), message) {
                    tracing::warn!(
                        generation,
                        event = kind,
                        error = %err,
                        "message handler failed"
                    );
                }
            }
            ChannelEvent::Status(status) if !status.is_drop() => {
                tracing::debug!(generation, "channel confirmed by provider");
            }
            ChannelEvent::Status(status) => {
                if !held {
                    tracing::debug!(generation, ?status, "drop reported before setup resolved");
                    self.pending_drop = Some(generation);
                    return;
                }
                tracing::warn!(
                    conversation_id = ?self.conversation,
                    ?status,
                    "channel dropped"
                );
                self.release_channel();
                self.transition(LifecycleState::Dropped);
                self.schedule_reconnect();
            }
        }
    }

    fn on_reconnect_due(&mut self, timer_id: u64) {
        if !self.reconnect.take_timer(timer_id) {
            tracing::debug!(timer_id, "ignoring stale reconnect timer");
            return;
        }
        if self.reconnect.is_cleaned_up() || self.channel.is_some() || self.pending_setup.is_some()
        {
            tracing::debug!(timer_id, "reconnect no longer needed");
            return;
        }

        if let Some(conversation_id) = self.conversation.clone() {
            tracing::debug!(
                conversation_id = %conversation_id,
                attempt = self.reconnect.attempts(),
                "reconnecting"
            );
            self.setup_channel(conversation_id);
        }
    }

    /// No channel, no setup in flight, no timer pending.
    fn awaiting_reconnect(&self) -> bool {
        !self.reconnect.is_cleaned_up()
            && self.channel.is_none()
            && self.pending_setup.is_none()
            && self.reconnect.pending_timer().is_none()
    }

    fn release_channel(&mut self) {
        if let Some(active) = self.channel.take() {
            self.unsubscribe(&active.handle);
        }
    }

    fn unsubscribe(&self, handle: &ChannelHandle) {
        if let Err(err) = self.deps.provider.unsubscribe(handle) {
            tracing::warn!(channel = ?handle.id(), error = %err, "channel release failed");
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        if self.state != next {
            if !self.state.can_transition_to(next) {
                tracing::warn!(from = ?self.state, to = ?next, "unexpected lifecycle transition");
            }
            self.state = next;
            self.deps.feed.publish(FeedEvent::StateChanged {
                conversation_id: self.conversation.clone(),
                state: next,
            });
        }
        self.sync_status();
    }

    fn sync_status(&self) {
        *self.status.write() = LifecycleStatus {
            conversation_id: self.conversation.clone(),
            state: self.state,
            attempts: self.reconnect.attempts(),
            has_channel: self.channel.is_some(),
            reconnect_stalled: self.reconnect_stalled,
        };
    }
}

impl Drop for SubscriptionLifecycleManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}
