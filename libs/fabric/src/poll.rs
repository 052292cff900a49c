use std::time::Duration;

/// Timing of the response poll loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Longest single receive; clamped to the time left before the deadline
    pub receive_wait: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl PollPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: self.initial_backoff,
            max: self.max_backoff,
            multiplier: self.multiplier.max(1.0),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            receive_wait: Duration::from_secs(3),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            multiplier: 1.5,
        }
    }
}

/// Sleep intervals between polls, growing geometrically up to a cap
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next.min(self.max);
        self.next = self.next.mul_f64(self.multiplier).min(self.max);
        Some(current)
    }
}
