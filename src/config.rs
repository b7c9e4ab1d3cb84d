use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens to the arguments of a trigger that arrives while a run is
/// already in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoalescePolicy {
    /// The trailing run reuses the arguments that started the current session;
    /// coalesced arguments are discarded.
    #[default]
    FirstOfSession,
    /// The trailing run uses the arguments of the most recent trigger.
    LatestTrigger,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("min_interval_ms must be non-negative, got {0}")]
    NegativeInterval(i64),
}

/// Per-job options, typically deserialized from the owning daemon's config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Minimum delay before every run of the job, including the first.
    /// 0 means no artificial delay.
    pub min_interval_ms: i64,
    pub coalesce: CoalescePolicy,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 0,
            coalesce: CoalescePolicy::FirstOfSession,
        }
    }
}

impl JobConfig {
    pub fn min_interval(&self) -> Result<Duration, ConfigError> {
        if self.min_interval_ms < 0 {
            return Err(ConfigError::NegativeInterval(self.min_interval_ms));
        }
        Ok(Duration::from_millis(self.min_interval_ms as u64))
    }
}
