//! Idle backoff for polling loops

use std::{iter::Iterator, time::Duration};

/// Capped exponential backoff iterator
///
/// Every call to `next` yields the previous delay multiplied by the `multiplier`, starting
/// at `initial` and never exceeding `limit`. Unlike a retry backoff it never runs dry, a polling
/// loop keeps waiting at the cap until [`reset`](IdleBackoff::reset) is called after it found work.
#[derive(Debug, Clone)]
pub struct IdleBackoff {
    initial: Duration,
    limit: Duration,
    multiplier: u32,
    current: Option<Duration>,
}

impl IdleBackoff {
    /// Creates a new instance which starts at `initial` and caps at `limit`
    pub fn new(initial: Duration, limit: Duration) -> Self {
        Self {
            initial,
            limit: limit.max(initial),
            multiplier: 2,
            current: None,
        }
    }

    /// Restarts the sequence at the initial delay
    pub fn reset(&mut self) {
        self.current = None;
    }
}

impl Default for IdleBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(10), Duration::from_millis(500))
    }
}

impl Iterator for IdleBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self.current {
            None => self.initial,
            Some(current) => (current * self.multiplier).min(self.limit),
        };

        self.current = Some(next);
        Some(next)
    }
}
