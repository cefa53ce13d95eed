//! spot-query: one nearby-spot query from the command line.
//!
//! Prints the spots as pretty JSON. Logging goes to stderr and is controlled
//! by `RUST_LOG`, falling back to `SPOT_LOG_LEVEL`.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use spot_channel::{ChannelConfig, RetryPolicy, SpotChannel, SpotQuery};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Query a spot backend for venues around a point
#[derive(Parser, Debug)]
#[command(name = "spot-query", version)]
#[command(about = "Query nearby spots over the real-time channel")]
struct Args {
    /// WebSocket endpoint (default: SPOT_WS_URL or ws://localhost:5000/ws)
    #[arg(short, long)]
    url: Option<String>,

    /// Latitude of the search centre
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,

    /// Longitude of the search centre
    #[arg(long, allow_negative_numbers = true)]
    lon: f64,

    /// Search radius in metres
    #[arg(short, long, default_value_t = SpotQuery::DEFAULT_RADIUS)]
    radius: f64,

    /// Maximum number of spots
    #[arg(short, long, default_value_t = SpotQuery::DEFAULT_LIMIT)]
    limit: u32,

    /// Backend filter as key=value; repeatable. JSON values are parsed.
    #[arg(short, long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, Value)>,

    /// Request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Fail on the first error instead of retrying
    #[arg(long)]
    no_retry: bool,
}

fn parse_filter(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", raw))?;
    if key.is_empty() {
        return Err(format!("empty filter key in {:?}", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("SPOT_LOG_LEVEL"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(args: &Args) -> ChannelConfig {
    let mut config = ChannelConfig::from_env();
    if let Some(url) = &args.url {
        config.url = url.clone();
    }
    if let Some(ms) = args.timeout_ms {
        config.timeouts.request = Duration::from_millis(ms);
    }
    if args.no_retry {
        config.retry = RetryPolicy::disabled();
    }
    config
}

fn build_query(args: &Args) -> SpotQuery {
    args.filters.iter().fold(
        SpotQuery::around(args.lat, args.lon)
            .with_radius(args.radius)
            .with_limit(args.limit),
        |query, (key, value)| query.with_filter(key.clone(), value.clone()),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = build_config(&args);
    let query = build_query(&args);
    debug!(?config, "Resolved configuration");

    let channel = SpotChannel::websocket(config).context("invalid channel configuration")?;
    let result = channel.query_with_retry(&query).await;
    channel.shutdown();

    let spots = result.with_context(|| format!("spot query to {} failed", channel.config().url))?;
    info!(count = spots.len(), "Received spots");
    println!("{}", serde_json::to_string_pretty(&spots)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_filter_json_and_plain_values() {
        assert_eq!(
            parse_filter("open_now=true").unwrap(),
            ("open_now".to_string(), json!(true))
        );
        assert_eq!(
            parse_filter("category=cafe").unwrap(),
            ("category".to_string(), json!("cafe"))
        );
        assert_eq!(
            parse_filter("price=2").unwrap(),
            ("price".to_string(), json!(2))
        );
        assert!(parse_filter("novalue").is_err());
        assert!(parse_filter("=x").is_err());
    }

    #[test]
    fn test_args_map_onto_query_and_config() {
        let args = Args::parse_from([
            "spot-query",
            "--url",
            "ws://example.test/ws",
            "--lat",
            "51.5074",
            "--lon",
            "-0.1278",
            "--radius",
            "1000",
            "--filter",
            "category=cafe",
            "--no-retry",
        ]);

        let query = build_query(&args);
        assert_eq!(query.radius, 1000.0);
        assert_eq!(query.limit, SpotQuery::DEFAULT_LIMIT);
        assert_eq!(query.longitude, -0.1278);
        assert_eq!(query.filters["category"], json!("cafe"));

        let config = build_config(&args);
        assert_eq!(config.url, "ws://example.test/ws");
        assert_eq!(config.retry.max_retries, 0);
    }
}
