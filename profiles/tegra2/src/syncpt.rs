//! # Host1x Sync Points
//!
//! Each sync point is a pair of 32-bit counters. `max` is bumped by the
//! driver when it submits a job that will increment the point; `min` is the
//! last value read back from the hardware. A job is complete once `min` has
//! reached the threshold returned at submission.

use core::sync::atomic::{AtomicU32, Ordering};

use pmdomain_hal::{CounterId, WorkTracker};

/// Number of sync points on Tegra2 host1x
pub const NUM_SYNCPTS: u32 = 32;

/// Sync point reserved for the display controller, never tracked by host1x jobs
pub const SYNCPT_DISP0: u32 = 5;

/// Software shadow of the host1x sync point counters
#[derive(Debug)]
pub struct Host1xSyncpoints {
    min: [AtomicU32; NUM_SYNCPTS as usize],
    max: [AtomicU32; NUM_SYNCPTS as usize],
}

impl Host1xSyncpoints {
    /// All points caught up at zero
    pub fn new() -> Self {
        Self {
            min: core::array::from_fn(|_| AtomicU32::new(0)),
            max: core::array::from_fn(|_| AtomicU32::new(0)),
        }
    }

    /// Reserve `incrs` increments for a submitted job; returns its threshold
    pub fn incr_max(&self, id: u32, incrs: u32) -> u32 {
        self.max[id as usize]
            .fetch_add(incrs, Ordering::AcqRel)
            .wrapping_add(incrs)
    }

    /// Record a value read back from the hardware
    pub fn update_min(&self, id: u32, value: u32) {
        self.min[id as usize].store(value, Ordering::Release);
    }

    /// Last hardware value
    pub fn read_min(&self, id: u32) -> u32 {
        self.min[id as usize].load(Ordering::Acquire)
    }

    /// Value the point reaches once every submitted job completes
    pub fn read_max(&self, id: u32) -> u32 {
        self.max[id as usize].load(Ordering::Acquire)
    }

    /// Whether `thresh` has been reached, comparing across wrap-around
    pub fn is_expired(&self, id: u32, thresh: u32) -> bool {
        let current = self.read_min(id);
        let future = self.read_max(id);

        if future.wrapping_sub(thresh) as i32 >= 0 {
            // thresh is in the submitted range
            current.wrapping_sub(thresh) as i32 >= 0
        } else {
            true
        }
    }

    fn tracked(id: CounterId) -> bool {
        id.0 < NUM_SYNCPTS && id.0 != SYNCPT_DISP0
    }
}

impl Default for Host1xSyncpoints {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkTracker for Host1xSyncpoints {
    fn name(&self) -> &str {
        "host1x-syncpt"
    }

    fn num_counters(&self) -> u32 {
        NUM_SYNCPTS
    }

    fn read_current(&self, id: CounterId) -> u32 {
        self.read_min(id.0)
    }

    fn read_expected(&self, id: CounterId) -> u32 {
        if Self::tracked(id) {
            self.read_max(id.0)
        } else {
            self.read_min(id.0)
        }
    }

    fn force_advance(&self, id: CounterId, by: u32) {
        log::debug!("host1x-syncpt: point {} advanced by {}", id.0, by);
        self.min[id.0 as usize].fetch_add(by, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_expiry() {
        let sp = Host1xSyncpoints::new();
        let thresh = sp.incr_max(3, 4);
        assert_eq!(thresh, 4);
        assert!(!sp.is_expired(3, thresh));

        sp.update_min(3, 4);
        assert!(sp.is_expired(3, thresh));
    }

    #[test]
    fn test_expiry_across_wrap() {
        let sp = Host1xSyncpoints::new();
        sp.update_min(1, u32::MAX - 1);
        sp.max[1].store(u32::MAX - 1, Ordering::Release);

        let thresh = sp.incr_max(1, 3);
        assert_eq!(thresh, 1);
        assert!(!sp.is_expired(1, thresh));
        assert_eq!(sp.pending(CounterId(1)), 3);

        sp.update_min(1, 1);
        assert!(sp.is_expired(1, thresh));
    }

    #[test]
    fn test_display_point_untracked() {
        let sp = Host1xSyncpoints::new();
        sp.incr_max(SYNCPT_DISP0, 10);
        assert_eq!(sp.pending(CounterId(SYNCPT_DISP0)), 0);
    }
}
