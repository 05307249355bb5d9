//! The live, ordered message set of the current conversation.

use crate::error::{RealtimeError, Result};
use crate::feed::{FeedEvent, FeedManager};
use crate::provider::MessageHandlers;
use crate::types::{ConversationId, Message, MessageId};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    conversation: Option<ConversationId>,
    /// Sorted by `(created_at, id)`, unique by id.
    messages: Vec<Message>,
}

impl Inner {
    fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }

    /// Insert or replace by id, keeping order. Returns true if it replaced.
    fn upsert(&mut self, message: Message) -> bool {
        let replaced = match self.position(&message.id) {
            Some(pos) => {
                self.messages.remove(pos);
                true
            }
            None => false,
        };
        let at = self
            .messages
            .partition_point(|m| m.sort_key() < message.sort_key());
        self.messages.insert(at, message);
        replaced
    }

    fn check_conversation(&self, event: &'static str, message: &Message) -> Result<()> {
        match &self.conversation {
            Some(expected) if expected != &message.conversation_id => {
                Err(RealtimeError::delivery(
                    event,
                    RealtimeError::ConversationMismatch {
                        expected: expected.clone(),
                        got: message.conversation_id.clone(),
                    }
                    .to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Message set kept current by the subscription handlers.
///
/// Inserts and updates are upserts keyed by message id, so a row that shows
/// up both in the initial fetch and on the channel is stored once.
pub struct MessageStore {
    inner: RwLock<Inner>,
    feed: Option<Arc<FeedManager>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            feed: None,
        }
    }

    /// Create a store that publishes every change to `feed`.
    pub fn with_feed(feed: Arc<FeedManager>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            feed: Some(feed),
        }
    }

    /// Current messages in display order.
    pub fn snapshot(&self) -> Vec<Message> {
        self.inner.read().messages.clone()
    }

    pub fn get(&self, id: &MessageId) -> Option<Message> {
        let inner = self.inner.read();
        inner.position(id).map(|pos| inner.messages[pos].clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().messages.is_empty()
    }

    pub fn conversation(&self) -> Option<ConversationId> {
        self.inner.read().conversation.clone()
    }

    fn publish(&self, event: FeedEvent) {
        if let Some(feed) = &self.feed {
            feed.publish(event);
        }
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHandlers for MessageStore {
    fn on_insert(&self, message: Message) -> Result<()> {
        let replaced = {
            let mut inner = self.inner.write();
            inner.check_conversation("insert", &message)?;
            inner.upsert(message.clone())
        };
        if replaced {
            self.publish(FeedEvent::MessageUpdated { message });
        } else {
            self.publish(FeedEvent::MessageInserted { message });
        }
        Ok(())
    }

    fn on_update(&self, message: Message) -> Result<()> {
        let replaced = {
            let mut inner = self.inner.write();
            inner.check_conversation("update", &message)?;
            inner.upsert(message.clone())
        };
        if replaced {
            self.publish(FeedEvent::MessageUpdated { message });
        } else {
            self.publish(FeedEvent::MessageInserted { message });
        }
        Ok(())
    }

    fn on_delete(&self, id: &MessageId) -> Result<()> {
        let removed = {
            let mut inner = self.inner.write();
            match inner.position(id) {
                Some(pos) => {
                    inner.messages.remove(pos);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.publish(FeedEvent::MessageDeleted { id: id.clone() });
        }
        Ok(())
    }

    fn on_initial(&self, conversation_id: &ConversationId, messages: Vec<Message>) -> Result<()> {
        let count = {
            let mut inner = self.inner.write();
            inner.conversation = Some(conversation_id.clone());
            inner.messages.clear();
            for message in messages {
                if &message.conversation_id != conversation_id {
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        message_id = %message.id,
                        "skipping fetched message from another conversation"
                    );
                    continue;
                }
                inner.upsert(message);
            }
            inner.messages.len()
        };
        self.publish(FeedEvent::Snapshot {
            conversation_id: conversation_id.clone(),
            count,
        });
        Ok(())
    }

    fn on_reset(&self, conversation_id: &ConversationId) {
        {
            let mut inner = self.inner.write();
            inner.conversation = Some(conversation_id.clone());
            inner.messages.clear();
        }
        self.publish(FeedEvent::Snapshot {
            conversation_id: conversation_id.clone(),
            count: 0,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedConfig;
    use crate::types::Timestamp;

    fn conv() -> ConversationId {
        ConversationId::new("c1")
    }

    fn msg(id: &str, at: i64) -> Message {
        Message::new(id, conv(), "u1", format!("body {id}")).at(Timestamp(at))
    }

    fn ids(store: &MessageStore) -> Vec<String> {
        store.snapshot().into_iter().map(|m| m.id.0).collect()
    }

    #[test]
    fn test_insert_keeps_time_order() {
        let store = MessageStore::new();
        store.on_insert(msg("b", 20)).unwrap();
        store.on_insert(msg("a", 10)).unwrap();
        store.on_insert(msg("c", 30)).unwrap();

        assert_eq!(ids(&store), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_insert_is_upsert() {
        let store = MessageStore::new();
        store.on_insert(msg("a", 10)).unwrap();
        let mut edited = msg("a", 10);
        edited.content = "edited".to_string();
        store.on_insert(edited).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&MessageId::from("a")).unwrap().content, "edited");
    }

    #[test]
    fn test_update_unknown_inserts() {
        let store = MessageStore::new();
        store.on_update(msg("a", 10)).unwrap();
        assert_eq!(ids(&store), vec!["a"]);
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let store = MessageStore::new();
        store.on_insert(msg("a", 10)).unwrap();
        store.on_delete(&MessageId::from("zzz")).unwrap();
        store.on_delete(&MessageId::from("a")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_initial_replaces_and_binds_conversation() {
        let store = MessageStore::new();
        store.on_insert(msg("stale", 1)).unwrap();

        let foreign = Message::new("x", ConversationId::new("other"), "u2", "nope");
        store
            .on_initial(&conv(), vec![msg("b", 20), msg("a", 10), foreign])
            .unwrap();

        assert_eq!(ids(&store), vec!["a", "b"]);
        assert_eq!(store.conversation(), Some(conv()));
    }

    #[test]
    fn test_rejects_other_conversation_after_bind() {
        let store = MessageStore::new();
        store.on_initial(&conv(), vec![]).unwrap();

        let foreign = Message::new("x", ConversationId::new("other"), "u2", "nope");
        let result = store.on_insert(foreign);
        assert!(matches!(
            result,
            Err(RealtimeError::Delivery { event: "insert", .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_reset_clears() {
        let store = MessageStore::new();
        store.on_insert(msg("a", 10)).unwrap();
        store.on_reset(&ConversationId::new("c2"));
        assert!(store.is_empty());
        assert_eq!(store.conversation(), Some(ConversationId::new("c2")));
    }

    #[test]
    fn test_reset_publishes_empty_snapshot() {
        let feed = Arc::new(FeedManager::new());
        let handle = feed.subscribe(FeedConfig::default());
        let store = MessageStore::with_feed(Arc::clone(&feed));
        store.on_initial(&conv(), vec![msg("a", 10)]).unwrap();
        let _ = handle.try_recv().unwrap();

        store.on_reset(&ConversationId::new("c2"));

        assert_eq!(
            handle.try_recv().unwrap(),
            FeedEvent::Snapshot {
                conversation_id: ConversationId::new("c2"),
                count: 0,
            }
        );
        assert!(handle.try_recv().is_err());
    }

    #[test]
    fn test_publishes_changes() {
        let feed = Arc::new(FeedManager::new());
        let handle = feed.subscribe(FeedConfig::default());
        let store = MessageStore::with_feed(Arc::clone(&feed));

        store.on_initial(&conv(), vec![msg("a", 10)]).unwrap();
        store.on_insert(msg("b", 20)).unwrap();
        store.on_update(msg("b", 20)).unwrap();
        store.on_delete(&MessageId::from("a")).unwrap();

        assert!(matches!(
            handle.try_recv().unwrap(),
            FeedEvent::Snapshot { count: 1, .. }
        ));
        assert!(matches!(
            handle.try_recv().unwrap(),
            FeedEvent::MessageInserted { .. }
        ));
        assert!(matches!(
            handle.try_recv().unwrap(),
            FeedEvent::MessageUpdated { .. }
        ));
        assert_eq!(
            handle.try_recv().unwrap(),
            FeedEvent::MessageDeleted {
                id: MessageId::from("a")
            }
        );
    }
}
