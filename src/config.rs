use std::time::Duration;

use serde::Deserialize;

// ─── Defaults ────────────────────────────────────────────────────────────

fn default_cert_load_timeout_secs() -> u64 {
    15
}

fn default_state_poll_interval_secs() -> u64 {
    5
}

// ─── Handler configuration ──────────────────────────────────────────────

/// Tunables for the connection handler.
///
/// Every field has a default, so `HandlerConfig::default()` is always a
/// usable configuration; embedders may also deserialize it from their own
/// config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// How long a certificate-gated connect may wait for the certificate
    /// store to finish loading, in seconds.
    #[serde(default = "default_cert_load_timeout_secs")]
    pub cert_load_timeout_secs: u64,

    /// Poll interval for the D-Bus network-state cache, in seconds.
    #[serde(default = "default_state_poll_interval_secs")]
    pub state_poll_interval_secs: u64,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            cert_load_timeout_secs: default_cert_load_timeout_secs(),
            state_poll_interval_secs: default_state_poll_interval_secs(),
        }
    }
}

impl HandlerConfig {
    pub fn cert_load_timeout(&self) -> Duration {
        Duration::from_secs(self.cert_load_timeout_secs)
    }

    pub fn state_poll_interval(&self) -> Duration {
        Duration::from_secs(self.state_poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config: HandlerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.cert_load_timeout(), Duration::from_secs(15));
        assert_eq!(config.state_poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config: HandlerConfig =
            serde_json::from_str(r#"{"cert_load_timeout_secs": 30}"#).unwrap();
        assert_eq!(config.cert_load_timeout(), Duration::from_secs(30));
        assert_eq!(config.state_poll_interval(), Duration::from_secs(5));
    }
}
