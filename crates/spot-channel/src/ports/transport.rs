//! Outbound port: the message transport under the connection manager.
//!
//! A [`Connector`] opens one physical connection and hands back a pair of
//! channels. The manager writes [`Frame`]s into `outbound` and reads them from
//! `inbound`; when `inbound` yields `None` the transport is gone without a
//! close frame.

use crate::domain::backoff::NORMAL_CLOSE_CODE;
use crate::domain::error::ChannelResult;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Close frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: NORMAL_CLOSE_CODE,
            reason: reason.into(),
        }
    }
}

/// One message on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close(Option<CloseFrame>),
}

/// Both directions of an open connection.
#[derive(Debug)]
pub struct TransportHandle {
    pub outbound: mpsc::Sender<Frame>,
    pub inbound: mpsc::Receiver<Frame>,
}

/// Opens connections to the remote endpoint.
///
/// Implementations return once the connection is open; the caller enforces
/// the connect deadline by dropping the future.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> ChannelResult<TransportHandle>;
}
