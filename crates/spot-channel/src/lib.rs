//! Spot Channel - real-time nearby-spot queries over one persistent WebSocket.
//!
//! Many concurrent callers share a single connection. Each query carries a
//! fresh correlation id and is answered by the response echoing it, in any
//! order.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        SpotChannel                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────────────┐                            │
//! │  │  Retrying (linear 1s/2s/3s)  │   query_with_retry()       │
//! │  └──────────────┬───────────────┘                            │
//! │  ┌──────────────┴───────────────┐   ┌─────────────────────┐  │
//! │  │      RequestCorrelator       │──►│  PendingRequests    │  │
//! │  │  (correlation id, 12s limit) │   │  id → oneshot       │  │
//! │  └──────────────┬───────────────┘   └──────────▲──────────┘  │
//! │  ┌──────────────┴───────────────┐              │ route       │
//! │  │      ConnectionManager       │──────────────┘             │
//! │  │  lazy connect, 8s deadline,  │                            │
//! │  │  exponential reconnect       │                            │
//! │  └──────────────┬───────────────┘                            │
//! └─────────────────┼────────────────────────────────────────────┘
//!                   │ Connector port
//!        ┌──────────┴──────────┐
//!        ▼                     ▼
//!   WsConnector         MemoryConnector
//!  (tokio-tungstenite)     (tests)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use spot_channel::{ChannelConfig, SpotChannel, SpotQuery};
//!
//! let channel = SpotChannel::websocket(ChannelConfig::from_env())?;
//! let spots = channel
//!     .query_with_retry(&SpotQuery::around(51.5074, -0.1278).with_radius(1000.0))
//!     .await?;
//! channel.shutdown();
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports for public API
pub use adapters::{ConnectBehavior, MemoryConnector, MemoryPeer, PendingSnapshot, WsConnector};
pub use domain::backoff::{LinkState, ReconnectPolicy, RetryPolicy};
pub use domain::config::{BufferConfig, ChannelConfig, TimeoutConfig};
pub use domain::correlation::CorrelationId;
pub use domain::error::{ChannelError, ChannelResult, ConfigError};
pub use domain::query::{Spot, SpotQuery};
pub use ports::{Connector, SpotQueryApi};
pub use service::{ConnectionManager, RequestCorrelator, Retrying, SpotChannel};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
