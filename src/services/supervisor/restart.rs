use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rolling window of recent start attempts used to detect restart storms.
///
/// A storm is `max_restarts` restarts in a row, each following the previous
/// start by less than `min_interval`, with no successful start in between.
#[derive(Debug, Clone)]
pub struct RestartTracker {
    starts: VecDeque<Instant>,
    max_restarts: usize,
    min_interval: Duration,
}

impl RestartTracker {
    pub fn new(max_restarts: usize, min_interval: Duration) -> Self {
        Self {
            starts: VecDeque::with_capacity(max_restarts + 1),
            max_restarts,
            min_interval,
        }
    }

    pub fn record_start(&mut self, at: Instant) {
        if self.starts.len() > self.max_restarts {
            self.starts.pop_front();
        }
        self.starts.push_back(at);
    }

    /// The process survived its start window.
    pub fn record_success(&mut self) {
        self.starts.clear();
    }

    pub fn attempts(&self) -> usize {
        self.starts.len()
    }

    /// Time covered by the recorded starts.
    pub fn window(&self) -> Duration {
        match (self.starts.front(), self.starts.back()) {
            (Some(first), Some(last)) => last.duration_since(*first),
            _ => Duration::ZERO,
        }
    }

    pub fn is_storm(&self) -> bool {
        if self.starts.len() <= self.max_restarts {
            return false;
        }
        self.starts
            .iter()
            .zip(self.starts.iter().skip(1))
            .all(|(prev, next)| next.duration_since(*prev) < self.min_interval)
    }
}
