use std::net::{IpAddr, Ipv4Addr};

use chrono::{DateTime, Utc};

const MONITOR_PORT: &str = "MONITOR_PORT";

const DEFAULT_PORT: u16 = 8080;

pub fn get_default_port() -> u16 {
    DEFAULT_PORT
}

/// Port for the read API, overridable through `MONITOR_PORT`
pub fn get_port(configured: Option<u16>) -> u16 {
    let fallback = configured.unwrap_or(DEFAULT_PORT);
    let port_from_env = std::env::var(MONITOR_PORT);
    port_from_env.map_or(fallback, |res| res.parse().unwrap_or(fallback))
}

const MONITOR_ADDR: &str = "MONITOR_ADDR";

const DEFAULT_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

pub fn get_default_addr() -> IpAddr {
    DEFAULT_ADDR
}

/// Bind address for the read API, overridable through `MONITOR_ADDR`
pub fn get_addr(configured: Option<IpAddr>) -> IpAddr {
    let fallback = configured.unwrap_or(DEFAULT_ADDR);
    let addr_from_env = std::env::var(MONITOR_ADDR);
    addr_from_env.map_or(fallback, |res| res.parse().unwrap_or(fallback))
}

const MONITOR_LOG: &str = "MONITOR_LOG";

/// Log level for the crate's own targets (`trace`, `debug`, `info`, ...)
pub fn get_log_level() -> tracing::level_filters::LevelFilter {
    std::env::var(MONITOR_LOG)
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or(tracing::level_filters::LevelFilter::INFO)
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Current instant truncated to microseconds
///
/// Records are keyed and stored at microsecond precision, so every timestamp
/// that becomes a sort key goes through here to round-trip unchanged.
pub fn now_micros() -> DateTime<Utc> {
    truncate_micros(Utc::now())
}

pub fn truncate_micros(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(timestamp.timestamp_micros()).unwrap_or(timestamp)
}
