//! Process supervision: single processes and the service groups that own them.

pub mod group;
pub mod process;
pub mod restart;

use std::time::Duration;

use crate::domain::models::SupervisionConfig;

pub use group::{ProcessStatus, ServiceSupervisor};
pub use process::ServiceProcess;
pub use restart::RestartTracker;

/// Timing limits applied to every supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTiming {
    /// A process alive this long after spawn counts as started.
    pub start_time_limit: Duration,
    /// Bound on waiting for exit after SIGTERM.
    pub stop_time_limit: Duration,
    /// Restarts closer together than this count toward a restart storm.
    pub min_restart_interval: Duration,
    pub max_restart_count: usize,
    /// Output lines kept per process for failure reports.
    pub message_lines: usize,
}

impl Default for ProcessTiming {
    fn default() -> Self {
        Self {
            start_time_limit: Duration::from_millis(1200),
            stop_time_limit: Duration::from_secs(20),
            min_restart_interval: Duration::from_millis(1200),
            max_restart_count: 3,
            message_lines: 10,
        }
    }
}

impl From<&SupervisionConfig> for ProcessTiming {
    fn from(config: &SupervisionConfig) -> Self {
        Self {
            start_time_limit: Duration::from_millis(config.start_time_limit_ms),
            stop_time_limit: Duration::from_millis(config.stop_time_limit_ms),
            min_restart_interval: Duration::from_millis(config.min_restart_interval_ms),
            max_restart_count: config.max_restart_count,
            message_lines: config.message_lines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing_matches_default_config() {
        assert_eq!(
            ProcessTiming::from(&SupervisionConfig::default()),
            ProcessTiming::default()
        );
    }
}
