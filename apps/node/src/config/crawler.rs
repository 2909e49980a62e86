use serde::Deserialize;

/// Pool size under `DEBUG=1`.
pub const DEBUG_CONNECTIONS: usize = 10;

const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 5;
const DEFAULT_PING_TIMEOUT_SECS: u64 = 15;

#[derive(Deserialize, Clone)]
pub struct CrawlerConfig {
    /// Size of the connection pool.
    #[serde(default = "default_connections")]
    pub connections: usize,

    /// Stop the process once the queue drains and no session remains.
    #[serde(default)]
    pub exit_when_idle: bool,

    /// Per-connection dial deadline, in seconds.
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout: u64,

    /// Keepalive phase deadline, in seconds.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_connections() -> usize {
    sonar_crawl::engine::DEFAULT_CONNECTIONS
}

fn default_dial_timeout() -> u64 {
    DEFAULT_DIAL_TIMEOUT_SECS
}

fn default_ping_timeout() -> u64 {
    DEFAULT_PING_TIMEOUT_SECS
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            connections: default_connections(),
            exit_when_idle: false,
            dial_timeout: default_dial_timeout(),
            ping_timeout: default_ping_timeout(),
        }
    }
}
