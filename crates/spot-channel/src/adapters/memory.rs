//! In-memory transport.
//!
//! Every accepted connection yields a [`MemoryPeer`] playing the server side.
//! The connector can also be told to refuse or to hang, which is how the
//! reconnect and timeout paths are exercised without a network.

use crate::domain::config::BufferConfig;
use crate::domain::error::{ChannelError, ChannelResult};
use crate::ports::transport::{CloseFrame, Connector, Frame, TransportHandle};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// How the next connect call behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Open a connection and hand the server side to the peer queue
    Accept,
    /// Fail immediately with a connection error
    Refuse(String),
    /// Never complete
    Hang,
}

struct MemoryState {
    default: ConnectBehavior,
    scripted: VecDeque<ConnectBehavior>,
    attempts: Vec<Instant>,
}

/// Connector backed by tokio channels.
pub struct MemoryConnector {
    state: Mutex<MemoryState>,
    buffers: BufferConfig,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    /// Create a connector that accepts by default, plus the queue on which
    /// server sides of accepted connections arrive.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        Self::with_buffers(BufferConfig::default())
    }

    /// Same as [`new`](Self::new) with explicit channel sizes.
    pub fn with_buffers(buffers: BufferConfig) -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Mutex::new(MemoryState {
                default: ConnectBehavior::Accept,
                scripted: VecDeque::new(),
                attempts: Vec::new(),
            }),
            buffers,
            peers,
        };
        (connector, peer_rx)
    }

    /// Behaviour used once the scripted queue is empty.
    pub fn set_default(&self, behavior: ConnectBehavior) {
        self.state.lock().default = behavior;
    }

    /// Queue a one-off behaviour for the next connect call.
    pub fn push_next(&self, behavior: ConnectBehavior) {
        self.state.lock().scripted.push_back(behavior);
    }

    /// Number of connect calls so far.
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts.len()
    }

    /// When each connect call happened.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state.lock().attempts.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _url: &str) -> ChannelResult<TransportHandle> {
        let behavior = {
            let mut state = self.state.lock();
            state.attempts.push(Instant::now());
            state
                .scripted
                .pop_front()
                .unwrap_or_else(|| state.default.clone())
        };

        match behavior {
            ConnectBehavior::Accept => {
                let (client_tx, server_rx) = mpsc::channel(self.buffers.outbound);
                let (server_tx, client_rx) = mpsc::channel(self.buffers.inbound);
                self.peers
                    .send(MemoryPeer {
                        incoming: server_rx,
                        outgoing: server_tx,
                    })
                    .map_err(|_| ChannelError::Connection("memory listener gone".into()))?;
                Ok(TransportHandle {
                    outbound: client_tx,
                    inbound: client_rx,
                })
            }
            ConnectBehavior::Refuse(reason) => Err(ChannelError::Connection(reason)),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }
}

/// Server side of an in-memory connection. Dropping it looks like the
/// network vanishing.
pub struct MemoryPeer {
    incoming: mpsc::Receiver<Frame>,
    outgoing: mpsc::Sender<Frame>,
}

impl MemoryPeer {
    /// Next frame sent by the client, `None` once the client side is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.incoming.recv().await
    }

    /// Next text frame parsed as JSON, skipping anything else.
    pub async fn recv_json(&mut self) -> Option<serde_json::Value> {
        while let Some(frame) = self.recv().await {
            if let Frame::Text(text) = frame {
                if let Ok(value) = serde_json::from_str(&text) {
                    return Some(value);
                }
            }
        }
        None
    }

    /// Send a JSON value as a text frame.
    pub async fn send_json(&self, value: &serde_json::Value) -> bool {
        self.outgoing
            .send(Frame::Text(value.to_string()))
            .await
            .is_ok()
    }

    /// Send a raw text frame.
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.outgoing.send(Frame::Text(text.into())).await.is_ok()
    }

    /// Close with an explicit close frame.
    pub async fn close(self, code: u16, reason: &str) {
        let _ = self
            .outgoing
            .send(Frame::Close(Some(CloseFrame {
                code,
                reason: reason.to_string(),
            })))
            .await;
    }
}
