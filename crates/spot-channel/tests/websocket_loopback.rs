//! # WebSocket Loopback Tests
//!
//! Runs the channel against a real `tokio-tungstenite` server on an ephemeral
//! localhost port, in real time.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use spot_channel::{ChannelConfig, ChannelError, LinkState, SpotChannel, SpotQuery};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("client should connect")
        .unwrap();
    accept_async(stream).await.unwrap()
}

/// Read the next JSON text message, skipping control frames.
async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Option<Value> {
    while let Some(msg) = ws.next().await {
        match msg.ok()? {
            Message::Text(text) => return serde_json::from_str(text.as_str()).ok(),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

fn fast_config(url: String) -> ChannelConfig {
    let mut config = ChannelConfig::with_url(url);
    config.timeouts.connect = Duration::from_secs(2);
    config.timeouts.request = Duration::from_secs(2);
    config.reconnect.base_delay = Duration::from_millis(50);
    config.reconnect.max_delay = Duration::from_millis(200);
    config
}

#[tokio::test]
async fn test_query_over_real_websocket() {
    // Arrange
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let request = next_json(&mut ws).await.expect("query frame");
        let reply = json!({
            "type": "spotsNearbyResponse",
            "requestId": request["requestId"],
            "spots": [{"id": 1, "name": "Test Cafe"}],
        });
        ws.send(Message::text(reply.to_string())).await.unwrap();
        request
    });
    let channel = SpotChannel::websocket(fast_config(url)).unwrap();

    // Act
    let spots = channel
        .query(&SpotQuery::around(51.5074, -0.1278).with_radius(1000.0))
        .await;

    // Assert
    assert_eq!(spots, Ok(vec![json!({"id": 1, "name": "Test Cafe"})]));
    let request = server.await.unwrap();
    assert_eq!(request["type"], "getSpotsNearby");
    assert_eq!(request["radius"], 1000.0);
    channel.shutdown();
}

#[tokio::test]
async fn test_refused_endpoint_is_a_connection_error() {
    // Bind then drop to get a port nothing listens on.
    let (listener, url) = listen().await;
    drop(listener);
    let channel = SpotChannel::websocket(fast_config(url)).unwrap();

    let result = channel.query(&SpotQuery::around(0.0, 0.0)).await;

    assert!(matches!(result, Err(ChannelError::Connection(_))));
    assert_eq!(channel.link_state(), LinkState::Idle);
}

#[tokio::test]
async fn test_server_close_codes_drive_reconnect() {
    let (listener, url) = listen().await;
    let channel = SpotChannel::websocket(fast_config(url)).unwrap();
    let mut link = channel.watch_link();

    // An abnormal close code brings a second connection.
    channel.start().await.unwrap();
    let mut first = accept(&listener).await;
    first
        .close(Some(CloseFrame {
            code: CloseCode::Error,
            reason: "restarting".into(),
        }))
        .await
        .unwrap();
    let mut second = accept(&listener).await;
    timeout(
        Duration::from_secs(5),
        link.wait_for(|state| *state == LinkState::Open),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(
        channel.connection_manager().current().unwrap().generation(),
        2
    );

    // A normal close does not.
    second
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();
    timeout(
        Duration::from_secs(5),
        link.wait_for(|state| *state == LinkState::Idle),
    )
    .await
    .unwrap()
    .unwrap();
    let reconnect = timeout(Duration::from_millis(500), listener.accept()).await;
    assert!(reconnect.is_err(), "no reconnect after a normal close");
}
