//! Pool configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of worker tasks pulling from the shared queue
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Forward offset in microseconds applied when a zero-interval task is
    /// re-queued, keeping due times strictly increasing
    #[serde(default = "default_requeue_offset_us")]
    pub requeue_offset_us: u64,
}

fn default_workers() -> usize {
    4
}

fn default_requeue_offset_us() -> u64 {
    1
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            requeue_offset_us: 1,
        }
    }
}

impl PoolConfig {
    /// Default configuration with the given number of workers
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    /// Get the zero-interval re-queue offset as a Duration
    pub fn requeue_offset(&self) -> Duration {
        Duration::from_micros(self.requeue_offset_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.requeue_offset_us, 1);
    }

    #[test]
    fn test_with_workers() {
        let config = PoolConfig::with_workers(8);
        assert_eq!(config.workers, 8);
        assert_eq!(config.requeue_offset_us, 1);
    }

    #[test]
    fn test_requeue_offset_duration() {
        let config = PoolConfig {
            requeue_offset_us: 250,
            ..Default::default()
        };
        assert_eq!(config.requeue_offset(), Duration::from_micros(250));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: PoolConfig = serde_json::from_str("{}").expect("empty config should parse");
        assert_eq!(config.workers, 4);
        assert_eq!(config.requeue_offset_us, 1);

        let config: PoolConfig =
            serde_json::from_str(r#"{"workers": 2}"#).expect("partial config should parse");
        assert_eq!(config.workers, 2);
        assert_eq!(config.requeue_offset_us, 1);
    }
}
