//! Configuration

use std::{env, path::PathBuf, time::Duration};

use humantime_serde::re::humantime;
use serde::{Deserialize, Serialize};

use crate::error::FossilizerError;

/// Default interval between batches.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Default maximum number of leaves per batch.
pub const DEFAULT_MAX_LEAVES: usize = 32 * 1024;

/// Fossilizer configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Time between two batches
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// A batch is sealed as soon as it holds this many leaves
    pub max_leaves: usize,
    /// Seal the pending batch on shutdown instead of leaving it in the log
    pub stop_batch_on_shutdown: bool,
    /// Directory for `pending.log`, sealed segments and archives.
    /// Nothing is persisted when unset.
    pub persist_path: Option<PathBuf>,
    /// `fsync` the pending log after every append
    pub fsync: bool,
    /// Write `batch-<N>.archive` when a batch completes
    pub archive: bool,
    /// Number of batches anchoring concurrently
    pub max_concurrent_anchors: usize,
    /// Deadline for a single anchor call
    #[serde(with = "humantime_serde")]
    pub anchor_timeout: Duration,
    /// Attempts per batch before giving up on retryable errors
    pub max_anchor_attempts: u32,
    /// First retry delay; doubled on each attempt
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    /// Upper bound of the retry delay
    #[serde(with = "humantime_serde")]
    pub retry_max_delay: Duration,
    /// How long `shutdown` waits for in-flight batches
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_leaves: DEFAULT_MAX_LEAVES,
            stop_batch_on_shutdown: true,
            persist_path: None,
            fsync: false,
            archive: true,
            max_concurrent_anchors: 2,
            anchor_timeout: Duration::from_secs(30),
            max_anchor_attempts: 5,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load from `FOSSILIZER_*` environment variables, keeping the default for
    /// anything missing or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: env_duration("FOSSILIZER_INTERVAL").unwrap_or(defaults.interval),
            max_leaves: env_parse("FOSSILIZER_MAX_LEAVES").unwrap_or(defaults.max_leaves),
            stop_batch_on_shutdown: env_bool("FOSSILIZER_STOP_BATCH")
                .unwrap_or(defaults.stop_batch_on_shutdown),
            persist_path: env::var("FOSSILIZER_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            fsync: env_bool("FOSSILIZER_FSYNC").unwrap_or(defaults.fsync),
            archive: env_bool("FOSSILIZER_ARCHIVE").unwrap_or(defaults.archive),
            max_concurrent_anchors: env_parse("FOSSILIZER_MAX_CONCURRENT_ANCHORS")
                .unwrap_or(defaults.max_concurrent_anchors),
            anchor_timeout: env_duration("FOSSILIZER_ANCHOR_TIMEOUT")
                .unwrap_or(defaults.anchor_timeout),
            max_anchor_attempts: env_parse("FOSSILIZER_MAX_ANCHOR_ATTEMPTS")
                .unwrap_or(defaults.max_anchor_attempts),
            retry_base_delay: env_duration("FOSSILIZER_RETRY_BASE_DELAY")
                .unwrap_or(defaults.retry_base_delay),
            retry_max_delay: env_duration("FOSSILIZER_RETRY_MAX_DELAY")
                .unwrap_or(defaults.retry_max_delay),
            shutdown_timeout: env_duration("FOSSILIZER_SHUTDOWN_TIMEOUT")
                .unwrap_or(defaults.shutdown_timeout),
        }
    }

    /// Reject values the driver cannot run with.
    pub fn validate(&self) -> Result<(), FossilizerError> {
        let invalid = |msg: &str| Err(FossilizerError::InvalidConfig(msg.to_string()));

        if self.interval.is_zero() {
            return invalid("interval must be positive");
        }
        if self.max_leaves == 0 {
            return invalid("max_leaves must be at least 1");
        }
        if self.max_concurrent_anchors == 0 {
            return invalid("max_concurrent_anchors must be at least 1");
        }
        if self.anchor_timeout.is_zero() {
            return invalid("anchor_timeout must be positive");
        }
        if self.max_anchor_attempts == 0 {
            return invalid("max_anchor_attempts must be at least 1");
        }
        if self.retry_base_delay > self.retry_max_delay {
            return invalid("retry_base_delay must not exceed retry_max_delay");
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().map(|s| s == "true" || s == "1")
}

fn env_duration(key: &str) -> Option<Duration> {
    env::var(key).ok().and_then(|s| humantime::parse_duration(s.trim()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.max_leaves, 32_768);
        assert!(config.stop_batch_on_shutdown);
        assert!(config.archive);
        assert!(!config.fsync);
        assert_eq!(config.persist_path, None);
        assert_eq!(config.max_anchor_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = Config { max_leaves: 0, ..Config::default() };
        assert!(matches!(config.validate(), Err(FossilizerError::InvalidConfig(_))));

        let config = Config { interval: Duration::ZERO, ..Config::default() };
        assert!(config.validate().is_err());

        let config = Config {
            retry_base_delay: Duration::from_secs(10),
            retry_max_delay: Duration::from_secs(1),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_uses_human_durations() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["interval"], "1m");
        assert_eq!(json["retry_base_delay"], "500ms");

        let parsed: Config =
            serde_json::from_str(r#"{"interval":"5s","max_leaves":10,"fsync":true}"#).unwrap();
        assert_eq!(parsed.interval, Duration::from_secs(5));
        assert_eq!(parsed.max_leaves, 10);
        assert!(parsed.fsync);
        assert_eq!(parsed.anchor_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_env_helpers_fall_back() {
        // Keys that are never set in the test environment.
        assert_eq!(env_parse::<usize>("FOSSILIZER_TEST_UNSET_NUMBER"), None);
        assert_eq!(env_bool("FOSSILIZER_TEST_UNSET_BOOL"), None);
        assert_eq!(env_duration("FOSSILIZER_TEST_UNSET_DURATION"), None);
    }
}
