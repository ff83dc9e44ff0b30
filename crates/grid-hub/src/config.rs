//! Tuning knobs for the real-time hub.
//!
//! Mirrors the `realtime` section of `grid-config.yaml`. Every field has a
//! serde default so a partial (or absent) section still yields a working
//! hub.

use std::time::Duration;

use serde::Deserialize;

/// Hub configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HubConfig {
    /// Capacity of each connection's outbound frame queue. When a queue is
    /// full the newest frame is dropped for that connection only.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    /// Capacity of the hub's command queue shared by all callers.
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,

    /// Frames a connection may drop before it is closed as a slow
    /// consumer. `0` never closes.
    #[serde(default = "default_max_dropped_messages")]
    pub max_dropped_messages: u64,

    /// Seconds between transport pings. `0` disables heartbeats.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

impl HubConfig {
    /// The heartbeat period, or `None` when heartbeats are disabled.
    pub const fn heartbeat_interval(&self) -> Option<Duration> {
        if self.heartbeat_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.heartbeat_interval_secs))
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: default_outbound_capacity(),
            command_capacity: default_command_capacity(),
            max_dropped_messages: default_max_dropped_messages(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_outbound_capacity() -> usize {
    256
}

const fn default_command_capacity() -> usize {
    1024
}

const fn default_max_dropped_messages() -> u64 {
    100
}

const fn default_heartbeat_interval_secs() -> u64 {
    25
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn partial_section_uses_defaults() {
        let config: HubConfig = serde_json::from_str(r#"{"outbound_capacity": 8}"#).unwrap();
        assert_eq!(config.outbound_capacity, 8);
        assert_eq!(config.command_capacity, 1024);
        assert_eq!(config.max_dropped_messages, 100);
    }

    #[test]
    fn zero_interval_disables_heartbeat() {
        let config = HubConfig {
            heartbeat_interval_secs: 0,
            ..HubConfig::default()
        };
        assert!(config.heartbeat_interval().is_none());
        assert_eq!(
            HubConfig::default().heartbeat_interval(),
            Some(Duration::from_secs(25))
        );
    }
}
