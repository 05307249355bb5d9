//! Consumer-facing message subscription.
//!
//! [`MessageSubscription`] runs a [`SubscriptionLifecycleManager`] on its own
//! event-loop thread and exposes what a chat view needs: start a
//! conversation, stop, read the live messages, watch for changes.

use crate::config::LifecycleConfig;
use crate::error::{RealtimeError, Result};
use crate::feed::{FeedConfig, FeedFilter, FeedHandle, FeedManager};
use crate::lifecycle::{LifecycleDeps, LoopEvent, SubscriptionLifecycleManager};
use crate::messages::MessageStore;
use crate::provider::{MessageFetcher, RealtimeProvider};
use crate::timer::{Scheduler, ThreadScheduler};
use crate::types::{ConversationId, LifecycleStatus, Message};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A running event loop.
struct LoopHandle {
    inbox: Sender<LoopEvent>,
    join: JoinHandle<()>,
}

/// Live message subscription for one conversation at a time.
///
/// ```ignore
/// let subscription = MessageSubscription::new(config, provider.clone(), provider)?;
/// subscription.start(ConversationId::new("general"))?;
/// let messages = subscription.messages();
/// subscription.stop();
/// ```
pub struct MessageSubscription {
    config: LifecycleConfig,
    provider: Arc<dyn RealtimeProvider>,
    fetcher: Arc<dyn MessageFetcher>,
    scheduler: Arc<dyn Scheduler>,
    store: Arc<MessageStore>,
    feed: Arc<FeedManager>,
    active: Mutex<Option<LoopHandle>>,
    /// Status cell of the most recent loop; survives `stop`.
    status: Mutex<Option<Arc<RwLock<LifecycleStatus>>>>,
}

impl MessageSubscription {
    pub fn new(
        config: LifecycleConfig,
        provider: Arc<dyn RealtimeProvider>,
        fetcher: Arc<dyn MessageFetcher>,
    ) -> Result<Self> {
        config.validate()?;
        let feed = Arc::new(FeedManager::new());
        let store = Arc::new(MessageStore::with_feed(Arc::clone(&feed)));

        Ok(Self {
            config,
            provider,
            fetcher,
            scheduler: Arc::new(ThreadScheduler::new()),
            store,
            feed,
            active: Mutex::new(None),
            status: Mutex::new(None),
        })
    }

    /// Use a different timer source for reconnects.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Subscribe to `conversation_id`.
    ///
    /// The first call spawns the event loop; later calls switch the running
    /// loop to the new conversation.
    pub fn start(&self, conversation_id: ConversationId) -> Result<()> {
        let mut active = self.active.lock();

        if let Some(running) = active.as_ref() {
            match running.inbox.send(LoopEvent::Start(conversation_id)) {
                Ok(()) => return Ok(()),
                Err(unsent) => {
                    tracing::warn!("subscription loop exited, restarting");
                    if let Some(dead) = active.take() {
                        if dead.join.join().is_err() {
                            tracing::error!("subscription loop panicked");
                        }
                    }
                    return self.spawn_and_start(&mut active, unsent.into_inner());
                }
            }
        }

        self.spawn_and_start(&mut active, LoopEvent::Start(conversation_id))
    }

    fn spawn_and_start(&self, active: &mut Option<LoopHandle>, start: LoopEvent) -> Result<()> {
        let handle = self.spawn_loop()?;
        handle
            .inbox
            .send(start)
            .map_err(|_| RealtimeError::LoopStopped)?;
        *active = Some(handle);
        Ok(())
    }

    fn spawn_loop(&self) -> Result<LoopHandle> {
        let (inbox, events) = unbounded();
        let deps = LifecycleDeps {
            provider: Arc::clone(&self.provider),
            fetcher: Arc::clone(&self.fetcher),
            handlers: self.store.clone(),
            scheduler: Arc::clone(&self.scheduler),
            feed: Arc::clone(&self.feed),
        };
        let mut manager =
            SubscriptionLifecycleManager::new(self.config.clone(), deps, inbox.clone());
        *self.status.lock() = Some(manager.status_cell());

        let join = thread::Builder::new()
            .name("chat-realtime-loop".to_string())
            .spawn(move || {
                for event in events.iter() {
                    if manager.handle(event).is_break() {
                        break;
                    }
                }
                tracing::debug!("subscription loop stopped");
            })?;

        Ok(LoopHandle { inbox, join })
    }

    /// Clean up and stop the event loop. Safe to call repeatedly.
    pub fn stop(&self) {
        let Some(running) = self.active.lock().take() else {
            return;
        };

        // A closed inbox means the loop already cleaned up.
        let _ = running.inbox.send(LoopEvent::Cleanup);
        if running.join.join().is_err() {
            tracing::error!("subscription loop panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Status of the current (or last) loop.
    pub fn status(&self) -> LifecycleStatus {
        self.status
            .lock()
            .as_ref()
            .map(|cell| cell.read().clone())
            .unwrap_or_default()
    }

    /// Current messages in display order.
    pub fn messages(&self) -> Vec<Message> {
        self.store.snapshot()
    }

    pub fn store(&self) -> Arc<MessageStore> {
        Arc::clone(&self.store)
    }

    /// Watch message and lifecycle changes.
    pub fn subscribe_feed(&self, filter: FeedFilter) -> FeedHandle {
        self.feed.subscribe(FeedConfig {
            buffer_size: self.config.feed_buffer_size,
            filter,
        })
    }

    pub fn feed(&self) -> &Arc<FeedManager> {
        &self.feed
    }
}

impl Drop for MessageSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}
