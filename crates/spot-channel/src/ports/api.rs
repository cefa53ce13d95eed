//! Inbound port: what callers use to search for spots.

use crate::domain::error::ChannelResult;
use crate::domain::query::{Spot, SpotQuery};
use async_trait::async_trait;

/// Anything that can answer a nearby-spot query.
#[async_trait]
pub trait SpotQueryApi: Send + Sync {
    async fn spots_nearby(&self, query: &SpotQuery) -> ChannelResult<Vec<Spot>>;
}
