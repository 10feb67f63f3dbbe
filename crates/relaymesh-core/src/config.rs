//! Relay configuration
//!
//! None of these values are negotiated on the wire; every node in a
//! deployment must be built or started with the same identities, port and
//! payload length.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{RelayError, Result};
use crate::packet::DEFAULT_PAYLOAD_LEN;

/// Well-known network name announced by the Root
pub const DEFAULT_ROOT_IDENTITY: &str = "TELEMETRY-ROOT";

/// Well-known network name announced by every Relay
pub const DEFAULT_RELAY_IDENTITY: &str = "TELEMETRY-RELAY";

/// Well-known UDP port
pub const DEFAULT_PORT: u16 = 4210;

/// Connection retry policy for link formation
///
/// Relays retry forever; Leaf endpoints give up after a few attempts and go
/// back to sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RetryPolicy {
    /// Keep retrying until the uplink accepts the connection
    Unbounded {
        /// Delay between attempts in milliseconds
        delay_ms: u64,
    },
    /// Give up after `max_attempts` failed attempts
    Bounded {
        /// Delay between attempts in milliseconds
        delay_ms: u64,
        /// Maximum number of attempts
        max_attempts: u32,
    },
}

impl RetryPolicy {
    /// Relay policy: unlimited attempts, 500 ms apart
    pub fn relay() -> Self {
        RetryPolicy::Unbounded { delay_ms: 500 }
    }

    /// Leaf policy: 20 attempts, 500 ms apart
    pub fn leaf() -> Self {
        RetryPolicy::Bounded {
            delay_ms: 500,
            max_attempts: 20,
        }
    }

    /// Delay between two attempts
    pub fn delay(&self) -> Duration {
        match self {
            RetryPolicy::Unbounded { delay_ms } | RetryPolicy::Bounded { delay_ms, .. } => {
                Duration::from_millis(*delay_ms)
            }
        }
    }

    /// Attempt limit, or `None` when unbounded
    pub fn max_attempts(&self) -> Option<u32> {
        match self {
            RetryPolicy::Unbounded { .. } => None,
            RetryPolicy::Bounded { max_attempts, .. } => Some(*max_attempts),
        }
    }

    /// Whether another attempt is allowed after `attempts` failures
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts().map(|max| attempts < max).unwrap_or(true)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::relay()
    }
}

/// Configuration for a relay session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Network name announced by the Root
    pub root_identity: String,
    /// Network name announced by Relays (and opened downstream by this node)
    pub relay_identity: String,
    /// Shared network secret used to join and open domains
    pub secret: String,
    /// UDP-style port for all traffic
    pub port: u16,
    /// Payload length of the fixed wire packet
    pub payload_len: usize,
    /// Telemetry period in milliseconds
    pub telemetry_period_ms: u64,
    /// Fixed telemetry payload marker byte
    pub telemetry_marker: u8,
    /// Number of telemetry sends before the session goes to sleep
    pub max_sends: u32,
    /// Sleep duration requested from the power collaborator, in seconds
    pub sleep_secs: u64,
    /// Connection retry policy
    pub retry: RetryPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            root_identity: DEFAULT_ROOT_IDENTITY.to_string(),
            relay_identity: DEFAULT_RELAY_IDENTITY.to_string(),
            secret: String::new(),
            port: DEFAULT_PORT,
            payload_len: DEFAULT_PAYLOAD_LEN,
            telemetry_period_ms: 5_000,
            telemetry_marker: 1,
            max_sends: 720, // one hour at the default period
            sleep_secs: 3_600,
            retry: RetryPolicy::relay(),
        }
    }
}

impl RelayConfig {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Parse and validate a configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let config: RelayConfig =
            serde_json::from_str(text).map_err(|e| RelayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| RelayError::Config(e.to_string()))
    }

    /// Check invariants the session relies on
    pub fn validate(&self) -> Result<()> {
        if self.root_identity.is_empty() || self.relay_identity.is_empty() {
            return Err(RelayError::Config("network identities must not be empty".into()));
        }
        if self.root_identity == self.relay_identity {
            return Err(RelayError::Config(
                "root and relay identities must differ".into(),
            ));
        }
        if self.payload_len == 0 {
            return Err(RelayError::Config("payload_len must be at least 1".into()));
        }
        if self.telemetry_period_ms == 0 {
            return Err(RelayError::Config("telemetry_period_ms must be non-zero".into()));
        }
        if self.max_sends == 0 {
            return Err(RelayError::Config("max_sends must be non-zero".into()));
        }
        if let Some(0) = self.retry.max_attempts() {
            return Err(RelayError::Config("bounded retry needs at least one attempt".into()));
        }
        Ok(())
    }

    /// Telemetry period as a duration
    pub fn telemetry_period(&self) -> Duration {
        Duration::from_millis(self.telemetry_period_ms)
    }

    /// Sleep duration as a duration
    pub fn sleep_duration(&self) -> Duration {
        Duration::from_secs(self.sleep_secs)
    }

    pub fn with_identities(mut self, root: &str, relay: &str) -> Self {
        self.root_identity = root.to_string();
        self.relay_identity = relay.to_string();
        self
    }

    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = secret.to_string();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_telemetry_period(mut self, period: Duration) -> Self {
        self.telemetry_period_ms = period.as_millis() as u64;
        self
    }

    pub fn with_max_sends(mut self, max_sends: u32) -> Self {
        self.max_sends = max_sends;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_payload_len(mut self, payload_len: usize) -> Self {
        self.payload_len = payload_len;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.payload_len, 1);
        assert_eq!(config.retry.max_attempts(), None);
    }

    #[test]
    fn test_json_roundtrip_and_partial_input() {
        let config = RelayConfig::default().with_max_sends(3);
        let json = config.to_json().unwrap();
        assert_eq!(RelayConfig::from_json(&json).unwrap(), config);

        // Missing fields fall back to defaults
        let partial = RelayConfig::from_json(r#"{ "port": 9000 }"#).unwrap();
        assert_eq!(partial.port, 9000);
        assert_eq!(partial.relay_identity, DEFAULT_RELAY_IDENTITY);
    }

    #[test]
    fn test_retry_policy_json() {
        let json = r#"{ "retry": { "kind": "bounded", "delay_ms": 10, "max_attempts": 3 } }"#;
        let config = RelayConfig::from_json(json).unwrap();
        assert_eq!(config.retry.max_attempts(), Some(3));
        assert_eq!(config.retry.delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_retry_policy_allows() {
        let relay = RetryPolicy::relay();
        assert!(relay.allows(0));
        assert!(relay.allows(u32::MAX - 1));

        let leaf = RetryPolicy::Bounded { delay_ms: 0, max_attempts: 2 };
        assert!(leaf.allows(0));
        assert!(leaf.allows(1));
        assert!(!leaf.allows(2));
    }

    #[test]
    fn test_validation_errors() {
        assert!(RelayConfig::default().with_payload_len(0).validate().is_err());
        assert!(RelayConfig::default().with_max_sends(0).validate().is_err());
        assert!(RelayConfig::default()
            .with_identities("SAME", "SAME")
            .validate()
            .is_err());
        assert!(RelayConfig::default()
            .with_telemetry_period(Duration::ZERO)
            .validate()
            .is_err());
    }
}
