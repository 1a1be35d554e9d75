//! # Fibonacci Backoff
//!
//! Progressive delay between retries of CMDB requests. Grows more slowly than
//! exponential backoff, which keeps a struggling NetBox from being hammered
//! while still giving up within seconds.
//!
//! ## Usage
//!
//! ```rust
//! use netbox_ssot::netbox::FibonacciBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = FibonacciBackoff::new(Duration::from_millis(500), Duration::from_secs(3));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(500));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(500));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(1000));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(1500));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(2500));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(3000));
//! ```

use std::time::Duration;

/// Fibonacci backoff calculator, in milliseconds.
///
/// Each delay is the sum of the previous two, starting at `min` twice and
/// capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_ms: u64,
    prev_ms: u64,
    current_ms: u64,
    max_ms: u64,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let min_ms = duration_ms(min);
        Self {
            min_ms,
            prev_ms: 0,
            current_ms: min_ms,
            max_ms: duration_ms(max).max(min_ms),
        }
    }

    /// Current delay in milliseconds; advances the sequence.
    pub fn next_backoff_ms(&mut self) -> u64 {
        let result = self.current_ms;
        let next = self.prev_ms.saturating_add(self.current_ms);
        self.prev_ms = self.current_ms;
        self.current_ms = next.min(self.max_ms);
        result
    }

    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_millis(self.next_backoff_ms())
    }

    /// Restart the sequence after a success.
    pub fn reset(&mut self) {
        self.prev_ms = 0;
        self.current_ms = self.min_ms;
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
