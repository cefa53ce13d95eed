//! Request-level retry with linear backoff.
//!
//! Independent of the connection manager's exponential reconnect policy: this
//! layer retries whole queries, whatever made them fail.

use crate::domain::backoff::RetryPolicy;
use crate::domain::error::ChannelResult;
use crate::domain::query::{Spot, SpotQuery};
use crate::ports::api::SpotQueryApi;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Wraps a querier with bounded retries.
pub struct Retrying<Q> {
    inner: Q,
    policy: RetryPolicy,
}

impl<Q: SpotQueryApi> Retrying<Q> {
    pub fn new(inner: Q, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &Q {
        &self.inner
    }

    /// Run the query, retrying failures per the policy. The last error is
    /// returned unchanged.
    pub async fn query_with_retry(&self, query: &SpotQuery) -> ChannelResult<Vec<Spot>> {
        let mut attempt = 0;
        loop {
            match self.inner.spots_nearby(query).await {
                Ok(spots) => {
                    if attempt > 0 {
                        debug!(attempt, count = spots.len(), "Spot query succeeded after retry");
                    }
                    return Ok(spots);
                }
                Err(error) => match self.policy.delay_after(attempt, &error) {
                    Some(delay) => {
                        warn!(
                            attempt,
                            error = %error,
                            kind = error.kind(),
                            delay_ms = delay.as_millis() as u64,
                            "Spot query failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(error),
                },
            }
        }
    }
}

#[async_trait]
impl<Q: SpotQueryApi> SpotQueryApi for Retrying<Q> {
    async fn spots_nearby(&self, query: &SpotQuery) -> ChannelResult<Vec<Spot>> {
        self.query_with_retry(query).await
    }
}
