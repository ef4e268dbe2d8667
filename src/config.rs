//! Bridge configuration loaded from environment variables.
//!
//! All values come from `TANDEM_*` variables with sensible defaults; invalid
//! values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `TANDEM_HANDSHAKE_TIMEOUT_MS` | 10000 | Worker bootstrap deadline (ms) |

use std::time::Duration;

/// Settings for establishing and running one proxy/worker pair.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// How long `connect` waits for the worker's bootstrap envelope before
    /// failing initialization.
    pub handshake_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(10_000),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from `TANDEM_*` environment variables.
    pub fn from_env() -> Self {
        let handshake_ms = parse_u64("TANDEM_HANDSHAKE_TIMEOUT_MS", 10_000).max(1);
        Self {
            handshake_timeout: Duration::from_millis(handshake_ms),
        }
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}
