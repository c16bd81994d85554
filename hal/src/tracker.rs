//! # Outstanding-work Trackers
//!
//! A sibling subsystem that queues asynchronous work against the powered
//! hardware (command streams, DMA chains) keeps monotonically increasing
//! counters: `expected` moves when work is submitted, `current` moves when
//! the hardware reports completion. Before a system-wide suspend every
//! counter must have caught up.
//!
//! Counters are 32-bit and wrap. Ordering is decided on the wrapping
//! distance, the way hardware sync points are compared.

/// Index of a counter inside a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CounterId(pub u32);

/// Tracker of outstanding asynchronous work, consulted at system suspend
pub trait WorkTracker: Send + Sync {
    /// Tracker name used in log messages
    fn name(&self) -> &str;

    /// Number of counters; ids run from `0` to `num_counters() - 1`
    fn num_counters(&self) -> u32;

    /// Value the hardware has reached
    fn read_current(&self, id: CounterId) -> u32;

    /// Value the counter will reach once all submitted work completes
    fn read_expected(&self, id: CounterId) -> u32;

    /// Move `current` forward by `by`, acknowledging work that will never complete
    fn force_advance(&self, id: CounterId, by: u32);

    /// How far `current` lags behind `expected`, zero if caught up
    fn pending(&self, id: CounterId) -> u32 {
        let delta = self.read_expected(id).wrapping_sub(self.read_current(id)) as i32;
        if delta > 0 {
            delta as u32
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct Single {
        current: AtomicU32,
        expected: AtomicU32,
    }

    impl WorkTracker for Single {
        fn name(&self) -> &str {
            "single"
        }

        fn num_counters(&self) -> u32 {
            1
        }

        fn read_current(&self, _id: CounterId) -> u32 {
            self.current.load(Ordering::Acquire)
        }

        fn read_expected(&self, _id: CounterId) -> u32 {
            self.expected.load(Ordering::Acquire)
        }

        fn force_advance(&self, _id: CounterId, by: u32) {
            self.current.fetch_add(by, Ordering::AcqRel);
        }
    }

    #[test]
    fn test_pending_simple() {
        let t = Single {
            current: AtomicU32::new(7),
            expected: AtomicU32::new(10),
        };
        assert_eq!(t.pending(CounterId(0)), 3);
        t.force_advance(CounterId(0), 3);
        assert_eq!(t.pending(CounterId(0)), 0);
    }

    #[test]
    fn test_pending_wraps() {
        let t = Single {
            current: AtomicU32::new(u32::MAX - 1),
            expected: AtomicU32::new(2),
        };
        assert_eq!(t.pending(CounterId(0)), 4);

        // current ahead of expected never counts as pending
        let t = Single {
            current: AtomicU32::new(12),
            expected: AtomicU32::new(10),
        };
        assert_eq!(t.pending(CounterId(0)), 0);
    }
}
