//! Channel error types.
//!
//! Every layer below the retry wrapper surfaces these unchanged, so the kind a
//! caller sees is the kind that actually happened.

use std::time::Duration;

/// Errors produced by the spot query channel.
///
/// `Clone` because one in-flight connect attempt is shared by every caller
/// that asked for a connection while it was running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// Connect attempt exceeded its deadline
    #[error("connection not open within {}ms", .0.as_millis())]
    ConnectionTimeout(Duration),

    /// Transport error while connecting
    #[error("connection error: {0}")]
    Connection(String),

    /// Acquired connection was not open when the query started
    #[error("connection not ready")]
    ConnectionNotReady,

    /// Request could not be handed to the transport
    #[error("send failed: {0}")]
    SendFailed(String),

    /// No matching response within the request deadline
    #[error("no response within {}ms", .0.as_millis())]
    RequestTimeout(Duration),

    /// Server answered with an explicit `error` field
    #[error("remote query error: {0}")]
    RemoteQuery(String),

    /// Channel was shut down
    #[error("channel shut down")]
    ShutDown,
}

impl ChannelError {
    /// True when the server explicitly rejected the query, as opposed to a
    /// transport or timing failure.
    pub fn is_remote_rejection(&self) -> bool {
        matches!(self, ChannelError::RemoteQuery(_))
    }

    /// Short stable label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelError::ConnectionTimeout(_) => "connection_timeout",
            ChannelError::Connection(_) => "connection_error",
            ChannelError::ConnectionNotReady => "connection_not_ready",
            ChannelError::SendFailed(_) => "send_failed",
            ChannelError::RequestTimeout(_) => "request_timeout",
            ChannelError::RemoteQuery(_) => "remote_query_error",
            ChannelError::ShutDown => "shut_down",
        }
    }
}

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
}
