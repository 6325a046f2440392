//! Dealer process configuration, read from the environment.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct DealerConfig {
    pub chain_rpc_url: String,
    pub matchmaking_url: String,
    pub settlement_url: String,
    pub bind_addr: String,
    pub turn_timeout: Duration,
    pub inter_hand_delay: Duration,
    pub discovery_interval: Duration,
    pub notify_timeout: Duration,
    pub event_poll_timeout: Duration,
    pub event_reconnect_delay: Duration,
}

impl DealerConfig {
    pub fn from_env() -> Self {
        Self {
            chain_rpc_url: std::env::var("CHAIN_RPC_URL")
                .unwrap_or_else(|_| "http://localhost:9933".to_string()),
            matchmaking_url: std::env::var("MATCHMAKING_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),
            settlement_url: std::env::var("SETTLEMENT_URL")
                .unwrap_or_else(|_| "http://localhost:3002".to_string()),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            turn_timeout: duration_env("TURN_TIMEOUT_SECS", 30),
            inter_hand_delay: duration_env("INTER_HAND_DELAY_SECS", 3),
            discovery_interval: duration_env("DISCOVERY_INTERVAL_SECS", 10),
            notify_timeout: duration_env("NOTIFY_TIMEOUT_SECS", 3),
            event_poll_timeout: duration_env("EVENT_POLL_TIMEOUT_SECS", 25),
            event_reconnect_delay: duration_env("EVENT_RECONNECT_DELAY_SECS", 5),
        }
    }
}

fn duration_env(key: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}
