//! Live message set exposed to the UI.

mod store;

pub use store::MessageStore;
