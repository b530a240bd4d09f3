//! Live game-state gateway: WebSocket sessions, the hub actor and fan-out.

pub mod events;
pub mod fanout;
pub mod hub;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;

pub use hub::{Hub, HubHandle};
