//! # Chat Realtime
//!
//! Keeps a chat view's message list live: one realtime channel per
//! conversation, recovered after drops with capped exponential backoff, and
//! torn down exactly once.
//!
//! ## Core Concepts
//!
//! - **Provider**: the hosted realtime backend, reached through
//!   [`RealtimeProvider`] and [`MessageFetcher`]
//! - **Lifecycle**: [`SubscriptionLifecycleManager`] owns the channel, the
//!   reconnect timer and the cleanup flag
//! - **Store**: [`MessageStore`] is the ordered live message set
//! - **Feed**: [`FeedManager`] broadcasts changes to UI observers
//!
//! ## Example
//!
//! ```ignore
//! use chat_realtime::{ConversationId, InMemoryRealtime, LifecycleConfig, MessageSubscription};
//!
//! let backend = Arc::new(InMemoryRealtime::new());
//! let subscription =
//!     MessageSubscription::new(LifecycleConfig::default(), backend.clone(), backend)?;
//!
//! subscription.start(ConversationId::new("general"))?;
//! for message in subscription.messages() {
//!     println!("{}: {}", message.sender_id, message.content);
//! }
//! subscription.stop();
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod feed;
pub mod lifecycle;
pub mod memory;
pub mod messages;
pub mod provider;
pub mod runtime;
pub mod timer;
pub mod types;

// Re-exports
pub use backoff::BackoffPolicy;
pub use config::LifecycleConfig;
pub use error::{RealtimeError, Result};
pub use feed::{DropReason, FeedConfig, FeedEvent, FeedFilter, FeedHandle, FeedId, FeedManager};
pub use lifecycle::{
    ChannelEvent, LifecycleDeps, LoopEvent, ReconnectState, SubscriptionLifecycleManager,
};
pub use memory::{InMemoryRealtime, SubscribeGate};
pub use messages::MessageStore;
pub use provider::{ChannelHandle, ChannelSink, MessageFetcher, MessageHandlers, RealtimeProvider};
pub use runtime::MessageSubscription;
pub use timer::{ManualScheduler, Scheduler, ThreadScheduler, TimerHandle, TimerTask};
pub use types::*;
