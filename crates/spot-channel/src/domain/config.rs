//! Channel configuration with validation.

use crate::domain::backoff::{ReconnectPolicy, RetryPolicy};
use crate::domain::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Default venue-search endpoint for local development.
pub const DEFAULT_URL: &str = "ws://localhost:5000/ws";

/// Main channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// WebSocket endpoint (`ws://` or `wss://`)
    pub url: String,
    /// Connect and request deadlines
    pub timeouts: TimeoutConfig,
    /// Connection-level exponential backoff
    pub reconnect: ReconnectPolicy,
    /// Request-level linear retry
    pub retry: RetryPolicy,
    /// Channel buffer sizes
    pub buffers: BufferConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            timeouts: TimeoutConfig::default(),
            reconnect: ReconnectPolicy::default(),
            retry: RetryPolicy::default(),
            buffers: BufferConfig::default(),
        }
    }
}

impl ChannelConfig {
    /// Default configuration pointed at `url`.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Overlay environment variables on the defaults.
    ///
    /// # Environment Variables
    ///
    /// - `SPOT_WS_URL`: endpoint (default: ws://localhost:5000/ws)
    /// - `SPOT_CONNECT_TIMEOUT_MS`: connect deadline (default: 8000)
    /// - `SPOT_REQUEST_TIMEOUT_MS`: per-request deadline (default: 12000)
    /// - `SPOT_MAX_RETRIES`: request retries (default: 3)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var("SPOT_WS_URL") {
            config.url = url;
        }
        if let Some(ms) = env_millis("SPOT_CONNECT_TIMEOUT_MS") {
            config.timeouts.connect = ms;
        }
        if let Some(ms) = env_millis("SPOT_REQUEST_TIMEOUT_MS") {
            config.timeouts.request = ms;
        }
        if let Some(retries) = env::var("SPOT_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.retry.max_retries = retries;
        }

        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUrl(format!(
                "expected ws:// or wss:// scheme, got {:?}",
                self.url
            )));
        }

        if self.timeouts.connect.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "connect timeout cannot be 0".into(),
            ));
        }

        if self.timeouts.request.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request timeout cannot be 0".into(),
            ));
        }

        if self.reconnect.base_delay > self.reconnect.max_delay {
            return Err(ConfigError::InvalidTimeout(
                "reconnect base_delay exceeds max_delay".into(),
            ));
        }

        if self.buffers.outbound == 0 || self.buffers.inbound == 0 || self.buffers.unsolicited == 0 {
            return Err(ConfigError::InvalidLimit(
                "channel buffers cannot be 0".into(),
            ));
        }

        Ok(())
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a connection to open
    #[serde(with = "humantime_serde")]
    pub connect: Duration,
    /// Deadline for a matching response after the request is sent
    #[serde(with = "humantime_serde")]
    pub request: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(8),
            request: Duration::from_secs(12),
        }
    }
}

/// Buffer sizes for the transport and broadcast channels
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Frames queued for the writer before sends fail
    pub outbound: usize,
    /// Frames queued from the reader
    pub inbound: usize,
    /// Unsolicited messages retained for slow subscribers
    pub unsolicited: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            outbound: 256,
            inbound: 1024,
            unsolicited: 64,
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.timeouts.connect, Duration::from_secs(8));
        assert_eq!(config.timeouts.request, Duration::from_secs(12));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.retry.retry_remote_errors);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_http_url() {
        let config = ChannelConfig::with_url("http://localhost:5000");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let mut config = ChannelConfig::default();
        config.timeouts.request = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn test_rejects_zero_buffers() {
        let mut config = ChannelConfig::default();
        config.buffers.outbound = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLimit(_))));
    }

    #[test]
    fn test_deserialize_partial_with_humantime() {
        let json = r#"{
            "url": "wss://api.example.com/ws",
            "timeouts": { "connect": "2s" },
            "retry": { "max_retries": 1, "retry_remote_errors": false }
        }"#;
        let config: ChannelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.url, "wss://api.example.com/ws");
        assert_eq!(config.timeouts.connect, Duration::from_secs(2));
        assert_eq!(config.timeouts.request, Duration::from_secs(12));
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.step, Duration::from_secs(1));
        assert!(!config.retry.retry_remote_errors);
        assert!(config.validate().is_ok());
    }
}
