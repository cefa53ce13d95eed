//! Spot channel service: wires the connection manager, correlator and retry
//! wrapper into one object with an explicit lifecycle.

pub mod connection;
pub mod correlator;
pub mod retry;

pub use connection::{Connection, ConnectionManager};
pub use correlator::RequestCorrelator;
pub use retry::Retrying;

use crate::adapters::pending::{PendingRequests, PendingSnapshot};
use crate::adapters::websocket::WsConnector;
use crate::domain::backoff::LinkState;
use crate::domain::config::ChannelConfig;
use crate::domain::error::{ChannelError, ChannelResult, ConfigError};
use crate::domain::query::{Spot, SpotQuery};
use crate::ports::api::SpotQueryApi;
use crate::ports::transport::Connector;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::info;

/// The real-time spot query channel.
///
/// Connections are opened lazily by the first query; [`start`](Self::start)
/// only warms the connection up. After [`shutdown`](Self::shutdown) every call
/// fails with [`ChannelError::ShutDown`] until `start` is called again.
/// Dropping the channel shuts it down.
pub struct SpotChannel {
    config: ChannelConfig,
    manager: Arc<ConnectionManager>,
    pending: Arc<PendingRequests>,
    unsolicited: broadcast::Sender<serde_json::Value>,
    querier: Retrying<RequestCorrelator>,
}

impl SpotChannel {
    /// Create a channel over any connector.
    pub fn new(config: ChannelConfig, connector: Arc<dyn Connector>) -> Result<Self, ConfigError> {
        config.validate()?;

        let pending = Arc::new(PendingRequests::new());
        let (unsolicited, _) = broadcast::channel(config.buffers.unsolicited);
        let manager = Arc::new(ConnectionManager::new(
            &config,
            connector,
            Arc::clone(&pending),
            unsolicited.clone(),
        ));
        let correlator = RequestCorrelator::new(
            Arc::clone(&manager),
            Arc::clone(&pending),
            config.timeouts.request,
        );
        let querier = Retrying::new(correlator, config.retry);

        Ok(Self {
            config,
            manager,
            pending,
            unsolicited,
            querier,
        })
    }

    /// Create a channel that dials `config.url` over WebSocket.
    pub fn websocket(config: ChannelConfig) -> Result<Self, ConfigError> {
        let connector = Arc::new(WsConnector::new(config.buffers));
        Self::new(config, connector)
    }

    /// Open the connection now instead of on the first query.
    pub async fn start(&self) -> ChannelResult<()> {
        self.manager.restart();
        let connection = self.manager.acquire().await?;
        info!(
            url = %self.config.url,
            generation = connection.generation(),
            "Spot channel started"
        );
        Ok(())
    }

    /// Close the connection, cancel reconnects and fail outstanding queries.
    pub fn shutdown(&self) {
        self.manager.shutdown();
        let failed = self.pending.fail_all(ChannelError::ShutDown);
        info!(url = %self.config.url, failed_requests = failed, "Spot channel shut down");
    }

    /// One query, no retries.
    pub async fn query(&self, query: &SpotQuery) -> ChannelResult<Vec<Spot>> {
        self.querier.inner().query(query).await
    }

    /// Query with the configured request-level retry.
    pub async fn query_with_retry(&self, query: &SpotQuery) -> ChannelResult<Vec<Spot>> {
        self.querier.query_with_retry(query).await
    }

    pub fn link_state(&self) -> LinkState {
        self.manager.link_state()
    }

    pub fn watch_link(&self) -> watch::Receiver<LinkState> {
        self.manager.watch_link()
    }

    /// Inbound messages of types this channel does not consume.
    pub fn subscribe_unsolicited(&self) -> broadcast::Receiver<serde_json::Value> {
        self.unsolicited.subscribe()
    }

    pub fn stats(&self) -> PendingSnapshot {
        self.pending.snapshot()
    }

    pub fn connection_manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }
}

impl Drop for SpotChannel {
    fn drop(&mut self) {
        self.manager.shutdown();
        self.pending.fail_all(ChannelError::ShutDown);
    }
}

#[async_trait]
impl SpotQueryApi for SpotChannel {
    async fn spots_nearby(&self, query: &SpotQuery) -> ChannelResult<Vec<Spot>> {
        self.query_with_retry(query).await
    }
}
