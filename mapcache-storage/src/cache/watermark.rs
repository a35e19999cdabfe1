//! Logical clock and invalidation watermarks.
//!
//! Every cache entry is stamped with a sequence drawn from one process-wide
//! logical clock. Invalidating a namespace raises its watermark to a fresh
//! tick of the same clock, so "created before the invalidation" is a plain
//! integer comparison and never depends on wall-clock time.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic sequence source shared by every session and shared cache.
#[derive(Debug, Default)]
pub struct LogicalClock {
    last: AtomicU64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence number. Never returns the same value twice.
    pub fn tick(&self) -> u64 {
        self.last.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// The most recently allocated sequence number (0 before the first tick).
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }
}

/// The most recent invalidation point of a namespace.
///
/// Entries whose sequence is below the watermark are logically gone even if
/// they are still physically stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark {
    /// Clock tick at which the invalidation happened.
    pub sequence: u64,
    /// When this watermark was raised.
    pub observed_at: DateTime<Utc>,
}

impl Watermark {
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            observed_at: Utc::now(),
        }
    }

    /// Create a zero watermark (nothing invalidated yet).
    pub fn zero() -> Self {
        Self {
            sequence: 0,
            observed_at: DateTime::UNIX_EPOCH,
        }
    }

    /// Check if this watermark is newer than another.
    pub fn is_newer_than(&self, other: &Watermark) -> bool {
        self.sequence > other.sequence
    }

    /// True when an entry created at `sequence` survives this watermark.
    pub fn admits(&self, sequence: u64) -> bool {
        sequence >= self.sequence
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_clock_is_strictly_increasing() {
        let clock = LogicalClock::new();
        assert_eq!(clock.current(), 0);
        let a = clock.tick();
        let b = clock.tick();
        assert!(b > a);
        assert_eq!(clock.current(), b);
    }

    #[test]
    fn test_clock_unique_across_threads() {
        let clock = Arc::new(LogicalClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                thread::spawn(move || (0..250).map(|_| clock.tick()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
        assert_eq!(clock.current(), 1000);
    }

    #[test]
    fn test_watermark_ordering() {
        let w1 = Watermark::new(1);
        let w2 = Watermark::new(2);
        assert!(w2.is_newer_than(&w1));
        assert!(!w1.is_newer_than(&w2));
    }

    #[test]
    fn test_watermark_admits() {
        let zero = Watermark::zero();
        assert!(zero.admits(0));
        assert!(zero.admits(1));

        let w = Watermark::new(10);
        assert!(!w.admits(9));
        assert!(w.admits(10));
        assert!(w.admits(11));
    }
}
