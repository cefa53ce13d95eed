//! Domain types for the spot channel.
//!
//! Pure data and decisions: configuration, errors, wire messages and the
//! reconnect state machine. Nothing here performs I/O.

pub mod backoff;
pub mod config;
pub mod correlation;
pub mod error;
pub mod messages;
pub mod query;

pub use backoff::{CloseKind, LinkMachine, LinkState, ReconnectPolicy, RetryPolicy, NORMAL_CLOSE_CODE};
pub use config::{BufferConfig, ChannelConfig, TimeoutConfig, DEFAULT_URL};
pub use correlation::CorrelationId;
pub use error::{ChannelError, ChannelResult, ConfigError};
pub use messages::{ClientMessage, ServerMessage};
pub use query::{Spot, SpotQuery};
