// crates/client/src/poll.rs
//! Poll scheduling.

use std::time::Duration;

use crate::types::JobSnapshot;

/// Delay between status fetches unless overridden.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Tuning knobs for the status poll loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between status fetches.
    pub interval: Duration,

    /// Consecutive transient fetch failures tolerated before the lifecycle is
    /// resolved as failed. `None` retries until the job itself terminates.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_consecutive_failures: None,
        }
    }
}

/// Delay before the next tick given the last observed snapshot.
///
/// Constant today. The snapshot parameter is the seam for adaptive backoff
/// (e.g. longer delays while queued) without touching the loop itself.
pub fn next_delay(config: &PollConfig, _last: Option<&JobSnapshot>) -> Duration {
    config.interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobStatus;

    #[test]
    fn test_default_config() {
        let config = PollConfig::default();
        assert_eq!(config.interval, Duration::from_millis(1000));
        assert!(config.max_consecutive_failures.is_none());
    }

    #[test]
    fn test_next_delay_is_constant_across_snapshots() {
        let config = PollConfig {
            interval: Duration::from_millis(250),
            max_consecutive_failures: None,
        };
        let queued = JobSnapshot {
            status: JobStatus::Queued,
            progress_percent: 0,
            step_description: None,
            findings_so_far: 0,
            error_message: None,
        };
        let scanning = JobSnapshot {
            status: JobStatus::Scanning,
            progress_percent: 90,
            step_description: None,
            findings_so_far: 3,
            error_message: None,
        };
        assert_eq!(next_delay(&config, None), Duration::from_millis(250));
        assert_eq!(next_delay(&config, Some(&queued)), Duration::from_millis(250));
        assert_eq!(next_delay(&config, Some(&scanning)), Duration::from_millis(250));
    }
}
