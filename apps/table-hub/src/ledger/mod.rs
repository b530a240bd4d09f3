//! Ingestion of committed ledger events.

pub mod bridge;
pub mod events;

pub use bridge::{BridgeError, EventBridge};
