use std::time::Duration;

/// Table hub configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    /// Ledger event stream (CometBFT JSON-RPC WebSocket), e.g. `ws://localhost:26657/websocket`.
    pub tendermint_ws_url: String,
    /// State-query REST origin, e.g. `http://localhost:1317`.
    pub state_query_url: String,
    /// Deadline for a single snapshot fetch.
    pub query_timeout: Duration,
    /// Fixed delay between upstream reconnect attempts.
    pub upstream_retry: Duration,
    /// Idle time after which the writer sends a keep-alive ping.
    pub keepalive_interval: Duration,
    /// A connection with no inbound frame for this long is considered dead.
    pub read_timeout: Duration,
    /// Deadline for writing one frame to a client.
    pub write_timeout: Duration,
    /// Capacity of each connection's outbound queue.
    pub outbound_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; defaults target a local single-node ledger.
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("WS_SERVER_PORT")
                .ok()
                .and_then(|v| parse_port(&v))
                .unwrap_or(8585),
            tendermint_ws_url: string_var("TENDERMINT_WS_URL", "ws://localhost:26657/websocket"),
            state_query_url: string_var("STATE_QUERY_URL", "http://localhost:1317"),
            query_timeout: secs_var("QUERY_TIMEOUT_SECS", 5),
            upstream_retry: secs_var("UPSTREAM_RETRY_SECS", 5),
            keepalive_interval: secs_var("KEEPALIVE_INTERVAL_SECS", 54),
            read_timeout: secs_var("READ_TIMEOUT_SECS", 60),
            write_timeout: secs_var("WRITE_TIMEOUT_SECS", 10),
            outbound_capacity: std::env::var("OUTBOUND_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(256),
        }
    }
}

/// Accepts both `8585` and `:8585`.
fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().trim_start_matches(':').parse().ok()
}

fn string_var(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn secs_var(name: &str, default: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_accepts_leading_colon() {
        assert_eq!(parse_port(":8585"), Some(8585));
        assert_eq!(parse_port("9000"), Some(9000));
        assert_eq!(parse_port("not-a-port"), None);
    }
}
