//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each connection gets two pump tasks: a writer draining the outbound channel
//! into the socket and a reader forwarding text and close frames inward.

use crate::domain::config::BufferConfig;
use crate::domain::error::{ChannelError, ChannelResult};
use crate::ports::transport::{CloseFrame, Connector, Frame, TransportHandle};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector that dials real WebSocket endpoints.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    buffers: BufferConfig,
}

impl WsConnector {
    pub fn new(buffers: BufferConfig) -> Self {
        Self { buffers }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> ChannelResult<TransportHandle> {
        let (ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| ChannelError::Connection(format!("failed to connect to {}: {}", url, e)))?;

        debug!(url = url, status = %response.status(), "WebSocket handshake complete");

        let (write, read) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.buffers.outbound);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.buffers.inbound);

        tokio::spawn(write_loop(write, outbound_rx));
        tokio::spawn(read_loop(read, inbound_tx));

        Ok(TransportHandle {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Drain outbound frames into the socket until a close frame or the
/// channel ends. A channel that ends without a close frame closes normally.
async fn write_loop(mut write: SplitSink<WsStream, Message>, mut outbound: mpsc::Receiver<Frame>) {
    let mut close = Some(CloseFrame::normal("client closed"));
    while let Some(frame) = outbound.recv().await {
        match frame {
            Frame::Text(text) => {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    warn!(error = %e, "WebSocket write failed");
                    return;
                }
            }
            Frame::Close(frame) => {
                close = frame;
                break;
            }
        }
    }
    let _ = write.send(Message::Close(close.map(to_ws_close))).await;
    let _ = write.close().await;
}

/// Forward inbound frames until the socket closes. Dropping `inbound` tells
/// the manager the transport is gone.
async fn read_loop(mut read: SplitStream<WsStream>, inbound: mpsc::Sender<Frame>) {
    while let Some(msg) = read.next().await {
        let frame = match msg {
            Ok(Message::Text(text)) => Frame::Text(text.as_str().to_owned()),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(text) => Frame::Text(text),
                Err(_) => {
                    debug!(len = data.len(), "Ignoring non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(close)) => {
                let _ = inbound.send(Frame::Close(close.map(from_ws_close))).await;
                return;
            }
            // tungstenite queues the pong itself on read
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
            Err(e) => {
                warn!(error = %e, "WebSocket read failed");
                return;
            }
        };

        if inbound.send(frame).await.is_err() {
            return;
        }
    }
}

fn to_ws_close(close: CloseFrame) -> WsCloseFrame {
    WsCloseFrame {
        code: CloseCode::from(close.code),
        reason: close.reason.into(),
    }
}

fn from_ws_close(close: WsCloseFrame) -> CloseFrame {
    CloseFrame {
        code: u16::from(close.code),
        reason: close.reason.as_str().to_owned(),
    }
}
