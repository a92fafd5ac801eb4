// ── Runtime sync configuration ──
//
// Constructed by the consumer and handed to the Coordinator -- core never
// reads config files. The liveness and keepalive constants are tuned for
// the vendor's servers but stay overridable.

use std::time::Duration;

use url::Url;

/// Configuration for one synchronization engine instance.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Vendor cloud base URL.
    pub api_base: Url,
    /// Engine.IO mount path on the cloud host.
    pub socketio_path: String,
    /// Socket.IO namespace carrying device events.
    pub namespace: String,
    /// Timeout for REST and handshake calls.
    pub request_timeout: Duration,
    /// Upper bound on a single long poll.
    pub poll_timeout: Duration,
    /// Pause between poll cycles.
    pub poll_pause: Duration,
    /// First-retry delay after a failed connect; doubles per consecutive
    /// failure.
    pub backoff_base: Duration,
    /// Ceiling on the doubling retry delay.
    pub backoff_ceiling: Duration,
    /// Reconnect when no frame at all (no-ops included) arrives within
    /// this window.
    pub idle_window: Duration,
    /// Reconnect when no substantive update arrives within this window,
    /// even though polling itself looks healthy.
    pub stale_window: Duration,
    /// Re-request the full snapshot every this many poll cycles.
    pub keepalive_poll_cycles: u64,
    /// Consecutive connect failures before a REST fallback refresh.
    pub fallback_threshold: u32,
    /// Pause before reconnecting after a mid-session drop.
    pub reconnect_cooldown: Duration,
    /// Zone addresses probed when bootstrapping over REST.
    pub bootstrap_zone_addrs: Vec<u32>,
    /// Optional `x-serialid` header value for REST calls.
    pub serial_id: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base: Url::parse("https://api-elnur.helki.com").expect("valid default URL"),
            socketio_path: "/socket.io/".into(),
            namespace: "/api/v2/socket_io".into(),
            request_timeout: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(30),
            poll_pause: Duration::from_millis(100),
            backoff_base: Duration::from_secs(5),
            backoff_ceiling: Duration::from_secs(60),
            idle_window: Duration::from_secs(40),
            stale_window: Duration::from_secs(300),
            keepalive_poll_cycles: 300,
            fallback_threshold: 10,
            reconnect_cooldown: Duration::from_secs(1),
            bootstrap_zone_addrs: vec![2, 3],
            serial_id: None,
        }
    }
}
