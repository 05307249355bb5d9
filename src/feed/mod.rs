//! Change feed for UI observers.
//!
//! Observers receive:
//! - Message inserts, updates, deletes and snapshot replacements
//! - Lifecycle transitions, including scheduled reconnects
//!
//! Each observer has a bounded buffer; an observer that falls behind is
//! dropped rather than slowing down delivery.
//!
//! # Example
//!
//! ```ignore
//! let handle = subscription.subscribe_feed(FeedConfig {
//!     filter: FeedFilter::lifecycle(),
//!     ..Default::default()
//! });
//!
//! loop {
//!     match handle.recv() {
//!         Ok(FeedEvent::ReconnectScheduled { delay_ms, .. }) => show_reconnecting(delay_ms),
//!         Ok(FeedEvent::StateChanged { state, .. }) => render_state(state),
//!         Ok(FeedEvent::Dropped { .. }) | Err(_) => break,
//!         Ok(_) => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::FeedManager;
pub use types::{DropReason, FeedConfig, FeedEvent, FeedFilter, FeedHandle, FeedId};
