//! Configuration for the transport layer.
//!
//! Configuration is consumed by
//! [`FailoverTransport::from_config()`](crate::FailoverTransport::from_config)
//! and can be constructed programmatically or deserialized from YAML/JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use journal_rpc::config::{RetryPolicyConfig, TransportConfig};
//!
//! let config = TransportConfig {
//!     connection_timeout: "500ms".into(),
//!     retry: RetryPolicyConfig::Fixed {
//!         max_retries: 2,
//!         delay: "100ms".into(),
//!     },
//!     ..Default::default()
//! };
//! assert_eq!(config.retry.build().max_retries(), 2);
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! TransportConfig
//! ├── connection_timeout: String   # Budget for establishing a replacement connection
//! ├── request_timeout: String      # Default per-attempt timeout ("0s" = wait forever)
//! ├── event_bus_capacity: usize    # Undelivered lifecycle events kept per subscriber
//! └── retry: RetryPolicyConfig     # fixed | increasing | exponential
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! connection_timeout: "3s"
//! request_timeout: "0s"
//! event_bus_capacity: 1024
//! retry:
//!   policy: increasing
//!   delays_ms: [50, 100, 500, 1000, 3000, 10000, 30000]
//!   max_retries: 50
//! ```

use crate::resilience::{
    ExponentialRetryPolicy, FixedRetryPolicy, IncreasingRetryPolicy, RetryPolicy,
    DEFAULT_DELAYS_MS, DEFAULT_MAX_RETRIES,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// TransportConfig: consumed by FailoverTransport::from_config()
// ═══════════════════════════════════════════════════════════════════════════════

/// Settings for one failover-protected connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Budget for establishing a replacement connection (humantime, e.g. "3s").
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: String,

    /// Default per-attempt timeout for callers that don't pass one.
    /// "0s" means wait indefinitely.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    /// Capacity of the lifecycle event bus.
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Retry budget and reconnect spacing.
    #[serde(default)]
    pub retry: RetryPolicyConfig,
}

fn default_connection_timeout() -> String {
    "3s".to_string()
}

fn default_request_timeout() -> String {
    "0s".to_string()
}

fn default_event_bus_capacity() -> usize {
    crate::event::DEFAULT_EVENT_CAPACITY
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connection_timeout: default_connection_timeout(),
            request_timeout: default_request_timeout(),
            event_bus_capacity: default_event_bus_capacity(),
            retry: RetryPolicyConfig::default(),
        }
    }
}

impl TransportConfig {
    /// Short timeouts and a small retry budget, for tests.
    pub fn for_testing() -> Self {
        Self {
            connection_timeout: "500ms".to_string(),
            request_timeout: "1s".to_string(),
            event_bus_capacity: 16,
            retry: RetryPolicyConfig::Fixed {
                max_retries: 2,
                delay: "0s".to_string(),
            },
        }
    }

    /// Parse connection_timeout, falling back to 3s if unparseable.
    pub fn connection_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.connection_timeout).unwrap_or(Duration::from_secs(3))
    }

    /// Parse request_timeout, falling back to no timeout if unparseable.
    pub fn request_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.request_timeout).unwrap_or(crate::transport::NO_TIMEOUT)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RetryPolicyConfig: which RetryPolicy to build
// ═══════════════════════════════════════════════════════════════════════════════

/// Serializable description of a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RetryPolicyConfig {
    /// Constant spacing between reconnects.
    Fixed {
        max_retries: usize,
        #[serde(default = "default_fixed_delay")]
        delay: String,
    },

    /// Explicit delay table in milliseconds; the last entry repeats.
    Increasing {
        #[serde(default = "default_delays_ms")]
        delays_ms: Vec<u64>,
        #[serde(default = "default_max_retries")]
        max_retries: usize,
    },

    /// `initial_delay * backoff_factor^attempt`, capped at `max_delay`.
    Exponential {
        #[serde(default = "default_max_retries")]
        max_retries: usize,
        #[serde(default = "default_initial_delay")]
        initial_delay: String,
        #[serde(default = "default_max_delay")]
        max_delay: String,
        #[serde(default = "default_backoff_factor")]
        backoff_factor: f64,
    },
}

fn default_fixed_delay() -> String {
    "1s".to_string()
}

fn default_delays_ms() -> Vec<u64> {
    DEFAULT_DELAYS_MS.to_vec()
}

fn default_max_retries() -> usize {
    DEFAULT_MAX_RETRIES
}

fn default_initial_delay() -> String {
    "100ms".to_string()
}

fn default_max_delay() -> String {
    "30s".to_string()
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self::Increasing {
            delays_ms: default_delays_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl RetryPolicyConfig {
    /// Build the policy. Unparseable durations fall back to their defaults.
    pub fn build(&self) -> Arc<dyn RetryPolicy> {
        match self {
            Self::Fixed { max_retries, delay } => Arc::new(FixedRetryPolicy::new(
                *max_retries,
                parse_or(delay, Duration::from_secs(1)),
            )),
            Self::Increasing {
                delays_ms,
                max_retries,
            } => Arc::new(IncreasingRetryPolicy::new(delays_ms.clone(), *max_retries)),
            Self::Exponential {
                max_retries,
                initial_delay,
                max_delay,
                backoff_factor,
            } => Arc::new(ExponentialRetryPolicy {
                max_retries: *max_retries,
                initial_delay: parse_or(initial_delay, Duration::from_millis(100)),
                max_delay: parse_or(max_delay, Duration::from_secs(30)),
                backoff_factor: *backoff_factor,
            }),
        }
    }
}

fn parse_or(value: &str, fallback: Duration) -> Duration {
    humantime::parse_duration(value).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.connection_timeout_duration(), Duration::from_secs(3));
        assert_eq!(config.request_timeout_duration(), Duration::ZERO);
        assert_eq!(config.event_bus_capacity, 1024);

        let policy = config.retry.build();
        assert_eq!(policy.max_retries(), 50);
        assert_eq!(policy.retry_delay(0), Duration::from_millis(50));
        assert_eq!(policy.retry_delay(50), Duration::from_secs(30));
    }

    #[test]
    fn test_timeout_parsing_various_formats() {
        let mut config = TransportConfig::default();

        config.connection_timeout = "250ms".to_string();
        assert_eq!(config.connection_timeout_duration(), Duration::from_millis(250));

        config.connection_timeout = "1m".to_string();
        assert_eq!(config.connection_timeout_duration(), Duration::from_secs(60));

        config.request_timeout = "2s 500ms".to_string();
        assert_eq!(config.request_timeout_duration(), Duration::from_millis(2500));
    }

    #[test]
    fn test_timeout_invalid_fallback() {
        let config = TransportConfig {
            connection_timeout: "soon".to_string(),
            request_timeout: "whenever".to_string(),
            ..Default::default()
        };
        assert_eq!(config.connection_timeout_duration(), Duration::from_secs(3));
        assert_eq!(config.request_timeout_duration(), Duration::ZERO);
    }

    #[test]
    fn test_for_testing_config() {
        let config = TransportConfig::for_testing();
        assert_eq!(config.connection_timeout_duration(), Duration::from_millis(500));
        let policy = config.retry.build();
        assert_eq!(policy.max_retries(), 2);
        assert_eq!(policy.retry_delay(3), Duration::ZERO);
    }

    #[test]
    fn test_exponential_build() {
        let config = RetryPolicyConfig::Exponential {
            max_retries: 4,
            initial_delay: "10ms".to_string(),
            max_delay: "40ms".to_string(),
            backoff_factor: 2.0,
        };
        let policy = config.build();
        assert_eq!(policy.max_retries(), 4);
        assert_eq!(policy.retry_delay(0), Duration::from_millis(10));
        assert_eq!(policy.retry_delay(1), Duration::from_millis(20));
        assert_eq!(policy.retry_delay(9), Duration::from_millis(40));
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = TransportConfig::for_testing();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: TransportConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_json_missing_fields_use_defaults() {
        let parsed: TransportConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, TransportConfig::default());
    }

    #[test]
    fn test_retry_policy_tagged_json() {
        let json = r#"{"policy":"fixed","max_retries":3,"delay":"200ms"}"#;
        let parsed: RetryPolicyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed,
            RetryPolicyConfig::Fixed {
                max_retries: 3,
                delay: "200ms".to_string()
            }
        );
        assert_eq!(parsed.build().retry_delay(0), Duration::from_millis(200));

        let json = r#"{"policy":"increasing","delays_ms":[5,1]}"#;
        let parsed: RetryPolicyConfig = serde_json::from_str(json).unwrap();
        let policy = parsed.build();
        assert_eq!(policy.max_retries(), 50);
        assert_eq!(policy.retry_delay(0), Duration::from_millis(1));
    }

    #[test]
    fn test_retry_policy_unknown_tag_rejected() {
        let json = r#"{"policy":"random"}"#;
        assert!(serde_json::from_str::<RetryPolicyConfig>(json).is_err());
    }
}
