//! Adapters: transports and the pending request table.

pub mod memory;
pub mod pending;
pub mod websocket;

pub use memory::{ConnectBehavior, MemoryConnector, MemoryPeer};
pub use pending::{PendingRequests, PendingSnapshot, QueryOutcome};
pub use websocket::WsConnector;
