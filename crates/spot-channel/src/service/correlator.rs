//! Request correlator: send a query, await the response carrying its id.

use crate::adapters::pending::PendingRequests;
use crate::domain::correlation::CorrelationId;
use crate::domain::error::{ChannelError, ChannelResult};
use crate::domain::messages::{response_outcome, ClientMessage, ServerMessage};
use crate::domain::query::{Spot, SpotQuery};
use crate::ports::api::SpotQueryApi;
use crate::service::connection::ConnectionManager;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Turns "send query, await matching response" into one awaitable call.
pub struct RequestCorrelator {
    manager: Arc<ConnectionManager>,
    pending: Arc<PendingRequests>,
    request_timeout: Duration,
}

impl RequestCorrelator {
    pub fn new(
        manager: Arc<ConnectionManager>,
        pending: Arc<PendingRequests>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            pending,
            request_timeout,
        }
    }

    /// Send one nearby-spot query and wait for its response.
    pub async fn query(&self, query: &SpotQuery) -> ChannelResult<Vec<Spot>> {
        let connection = self.manager.acquire().await?;
        if !connection.is_open() {
            return Err(ChannelError::ConnectionNotReady);
        }

        let (correlation_id, mut rx) = self.pending.register();
        // Releases the entry if this future is dropped mid-flight.
        let _release = ReleaseOnDrop {
            pending: &self.pending,
            correlation_id,
        };

        let payload = ClientMessage::spots_nearby(correlation_id, query)
            .to_json()
            .map_err(|e| ChannelError::SendFailed(format!("encode: {}", e)))?;

        if let Err(error) = connection.send_text(payload) {
            self.pending.cancel(&correlation_id);
            warn!(correlation_id = %correlation_id, error = %error, "Failed to send spot query");
            return Err(error);
        }

        debug!(
            correlation_id = %correlation_id,
            generation = connection.generation(),
            latitude = query.latitude,
            longitude = query.longitude,
            radius = query.radius,
            "Sent spot query"
        );

        match tokio::time::timeout(self.request_timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ChannelError::ShutDown),
            Err(_) => {
                if self.pending.expire(&correlation_id) {
                    warn!(
                        correlation_id = %correlation_id,
                        timeout_ms = self.request_timeout.as_millis() as u64,
                        "Spot query timed out"
                    );
                    Err(ChannelError::RequestTimeout(self.request_timeout))
                } else {
                    // The response won the race against the timer.
                    rx.try_recv().unwrap_or(Err(ChannelError::ShutDown))
                }
            }
        }
    }
}

#[async_trait]
impl SpotQueryApi for RequestCorrelator {
    async fn spots_nearby(&self, query: &SpotQuery) -> ChannelResult<Vec<Spot>> {
        self.query(query).await
    }
}

struct ReleaseOnDrop<'a> {
    pending: &'a PendingRequests,
    correlation_id: CorrelationId,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.pending.cancel(&self.correlation_id);
    }
}

/// Route one inbound text frame.
///
/// `spotsNearbyResponse` frames complete the pending request with the echoed
/// id; frames of any other type go to `unsolicited` subscribers.
pub(crate) fn route_message(
    pending: &PendingRequests,
    unsolicited: &broadcast::Sender<Value>,
    text: &str,
) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Ignoring non-JSON frame");
            return;
        }
    };

    match ServerMessage::deserialize(&value) {
        Ok(ServerMessage::SpotsNearbyResponse {
            request_id,
            spots,
            error,
        }) => match CorrelationId::parse(&request_id) {
            Ok(correlation_id) => {
                pending.complete(correlation_id, response_outcome(spots, error));
            }
            Err(_) => debug!(request_id = %request_id, "Ignoring response with foreign request id"),
        },
        Ok(ServerMessage::Other) => {
            // No subscribers is fine.
            let _ = unsolicited.send(value);
        }
        Err(e) => {
            let malformed_id = value
                .get("type")
                .and_then(Value::as_str)
                .filter(|t| *t == "spotsNearbyResponse")
                .and_then(|_| value.get("requestId"))
                .and_then(Value::as_str)
                .and_then(|id| CorrelationId::parse(id).ok());

            match malformed_id {
                Some(correlation_id) => {
                    warn!(correlation_id = %correlation_id, error = %e, "Malformed spot response");
                    pending.complete(
                        correlation_id,
                        Err(ChannelError::RemoteQuery(format!("malformed response: {}", e))),
                    );
                }
                None => debug!(error = %e, "Ignoring unrecognised frame"),
            }
        }
    }
}
