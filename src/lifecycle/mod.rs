//! Realtime channel lifecycle for a conversation.
//!
//! The manager moves through
//! `Idle -> Subscribing -> Subscribed -> (Dropped -> Subscribing)* -> CleanedUp`:
//! - setup runs off-loop and reports back with a generation tag
//! - drops release the dead channel and schedule a reconnect with capped
//!   exponential backoff
//! - cleanup is terminal and idempotent
//!
//! # Example
//!
//! ```ignore
//! let (inbox, events) = crossbeam_channel::unbounded();
//! let mut manager = SubscriptionLifecycleManager::new(config, deps, inbox);
//!
//! manager.start(ConversationId::new("general"));
//! for event in events.iter() {
//!     if manager.handle(event).is_break() {
//!         break;
//!     }
//! }
//! ```

mod events;
mod manager;
mod state;

pub use events::{ChannelEvent, LoopEvent};
pub use manager::{LifecycleDeps, SubscriptionLifecycleManager};
pub use state::ReconnectState;
