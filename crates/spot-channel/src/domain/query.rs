//! Nearby-spot query payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A venue as returned by the backend. Opaque to the channel.
pub type Spot = Value;

/// Search for spots around a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotQuery {
    pub latitude: f64,
    pub longitude: f64,
    /// Search radius in metres
    pub radius: f64,
    /// Maximum number of spots returned
    pub limit: u32,
    /// Backend-defined filters, forwarded verbatim
    #[serde(default)]
    pub filters: Map<String, Value>,
}

impl SpotQuery {
    /// Default search radius in metres
    pub const DEFAULT_RADIUS: f64 = 1800.0;
    /// Default result limit
    pub const DEFAULT_LIMIT: u32 = 25;

    /// Query with the default radius and limit and no filters.
    pub fn around(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius: Self::DEFAULT_RADIUS,
            limit: Self::DEFAULT_LIMIT,
            filters: Map::new(),
        }
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_around_uses_defaults() {
        let query = SpotQuery::around(51.5074, -0.1278);
        assert_eq!(query.radius, 1800.0);
        assert_eq!(query.limit, 25);
        assert!(query.filters.is_empty());
    }

    #[test]
    fn test_builder_filters() {
        let query = SpotQuery::around(0.0, 0.0)
            .with_radius(500.0)
            .with_limit(5)
            .with_filter("category", "cafe")
            .with_filter("openNow", true);
        assert_eq!(query.radius, 500.0);
        assert_eq!(query.limit, 5);
        assert_eq!(query.filters["category"], "cafe");
        assert_eq!(query.filters["openNow"], true);
    }
}
