//! Feed manager broadcasting message and lifecycle changes to observers.

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{DropReason, FeedConfig, FeedEvent, FeedHandle, FeedId};

/// Internal subscriber state.
struct Subscriber {
    config: FeedConfig,
    sender: Sender<FeedEvent>,
}

impl Subscriber {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (subscriber will be dropped).
    fn try_send(&self, event: FeedEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    fn wants(&self, event: &FeedEvent) -> bool {
        if event.is_message_event() {
            self.config.filter.include_messages
        } else {
            self.config.filter.include_lifecycle
        }
    }
}

/// Manages feed subscribers and broadcasts events.
pub struct FeedManager {
    subscribers: RwLock<HashMap<FeedId, Subscriber>>,
    next_id: AtomicU64,
}

impl FeedManager {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new feed subscription.
    pub fn subscribe(&self, config: FeedConfig) -> FeedHandle {
        let id = FeedId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.subscribers
            .write()
            .insert(id, Subscriber { config, sender });

        FeedHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: FeedId) {
        if let Some(sub) = self.subscribers.write().remove(&id) {
            // Best effort; the receiver may already be gone.
            let _ = sub.sender.try_send(FeedEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Broadcast an event to every interested subscriber. Drops subscribers
    /// that fail to receive.
    pub fn publish(&self, event: FeedEvent) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscribers.read();
            for (id, sub) in subs.iter() {
                if sub.wants(&event) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscribers.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    tracing::debug!(feed_id = id.0, "dropping slow feed subscriber");
                    let _ = sub.sender.try_send(FeedEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for FeedManager {
    fn default() -> Self {
        Self::new()
    }
}
