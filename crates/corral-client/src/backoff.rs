//! Reconnection backoff policies

use rand::Rng;
use std::time::Duration;

/// Maps a consecutive-failure count to a reconnection delay
///
/// Pluggable so tests can substitute a zero-delay policy for fast,
/// deterministic runs.
pub trait BackoffPolicy: Send + Sync + 'static {
    /// Delay before reconnection attempt `attempt` (1-based)
    fn delay(&self, attempt: u32) -> Duration;
}

/// Bounded, increasing delay table with jitter
///
/// The delay for attempt `n` is drawn uniformly from the upper half of the
/// table entry, so a fleet of reconnecting clients does not stampede the
/// server. Attempts past the end of the table reuse the last entry.
pub struct TableBackoff {
    table: Vec<Duration>,
    jitter: bool,
}

impl TableBackoff {
    pub fn new(table: Vec<Duration>) -> Self {
        Self {
            table,
            jitter: true,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

impl Default for TableBackoff {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(30),
            Duration::from_secs(60),
        ])
    }
}

impl BackoffPolicy for TableBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        if self.table.is_empty() {
            return Duration::ZERO;
        }
        let index = (attempt.saturating_sub(1) as usize).min(self.table.len() - 1);
        let base = self.table[index];
        if !self.jitter || base.is_zero() {
            return base;
        }
        let micros = base.as_micros() as u64;
        Duration::from_micros(rand::thread_rng().gen_range(micros / 2..=micros))
    }
}

/// Zero-delay policy for tests
pub struct NoBackoff;

impl BackoffPolicy for NoBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}
