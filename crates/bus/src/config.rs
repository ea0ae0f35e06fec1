//! Bus configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sentinel that disables the request timer
pub const NO_TIMEOUT: i64 = -1;

/// How long a request waits for its response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    After(Duration),
    /// Wait forever. The caller is responsible for dropping the future.
    Never,
}

impl Timeout {
    /// `-1` means no timeout, any other negative value is treated as zero
    pub fn from_millis(ms: i64) -> Self {
        if ms == NO_TIMEOUT {
            Timeout::Never
        } else {
            Timeout::After(Duration::from_millis(ms.max(0) as u64))
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::After(duration)
    }
}

/// Bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Default request timeout in milliseconds, `-1` to disable
    pub default_timeout_ms: i64,
}

impl BusConfig {
    pub fn default_timeout(&self) -> Timeout {
        Timeout::from_millis(self.default_timeout_ms)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout() {
        let config = BusConfig::default();
        assert_eq!(
            config.default_timeout(),
            Timeout::After(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_sentinel_disables_timer() {
        let config: BusConfig = serde_json::from_str(r#"{ "default_timeout_ms": -1 }"#).unwrap();
        assert_eq!(config.default_timeout(), Timeout::Never);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: BusConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.default_timeout_ms, 5000);
    }
}
