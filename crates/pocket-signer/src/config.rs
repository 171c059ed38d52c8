use std::time::Duration;

/// Default relay endpoint.
pub const DEFAULT_RELAY_URL: &str = "https://bubbleblock.io/PolymeshPocket.php";

/// Default interval between relay polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default wall-clock window for pairing approval and for each signing request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Engine configuration, passed in at construction.
///
/// Production callers can use `EngineConfig::default()`; tests shrink the
/// intervals to keep polling scenarios deterministic and fast.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the relay; endpoints are selected via `?endpoint=`.
    pub relay_url: String,
    /// Interval between session/history polls.
    pub poll_interval: Duration,
    /// How long to wait for the wallet to approve a pairing.
    pub pairing_timeout: Duration,
    /// How long each signing request may stay outstanding.
    pub signing_timeout: Duration,
    /// Origin tag recorded on the remote session row.
    pub origin_tag: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            pairing_timeout: DEFAULT_TIMEOUT,
            signing_timeout: DEFAULT_TIMEOUT,
            origin_tag: "cli".to_string(),
        }
    }
}
