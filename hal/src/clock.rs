//! # Clocks and Power Islands
//!
//! Handles and the driver trait the controller uses to switch clocks,
//! program their rates and sequence power islands.
//!
//! ## Power-gate Sequencing
//!
//! ```text
//!   power up                          power down
//!   ────────                          ──────────
//!   power_island_up(id, clk)          disable(clk)
//!     ├─ assert reset                 assert_reset(clk)
//!     ├─ enable clock                 power_island_down(id)
//!     ├─ remove clamps
//!     └─ deassert reset
//! ```
//!
//! The driver owns the sequence inside `power_island_up`; the controller only
//! adds the settle delay after it returns.

use core::fmt;

use crate::error::HalResult;

// ============================================================================
// Frequency
// ============================================================================

/// A clock frequency in hertz
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hertz(pub u64);

impl Hertz {
    const KHZ_TO_HZ: u64 = 1_000;
    const MHZ_TO_HZ: u64 = 1_000_000;

    /// Zero hertz
    pub const ZERO: Hertz = Hertz(0);

    /// Create from kilohertz
    pub const fn from_khz(khz: u64) -> Self {
        Self(khz * Self::KHZ_TO_HZ)
    }

    /// Create from megahertz
    pub const fn from_mhz(mhz: u64) -> Self {
        Self(mhz * Self::MHZ_TO_HZ)
    }

    /// Frequency in hertz
    pub const fn as_hz(&self) -> u64 {
        self.0
    }

    /// Frequency in kilohertz
    pub const fn as_khz(&self) -> u64 {
        self.0 / Self::KHZ_TO_HZ
    }

    /// Frequency in megahertz
    pub const fn as_mhz(&self) -> u64 {
        self.0 / Self::MHZ_TO_HZ
    }
}

impl fmt::Display for Hertz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= Self::MHZ_TO_HZ && self.0 % Self::KHZ_TO_HZ == 0 {
            write!(f, "{}.{:03} MHz", self.as_mhz(), self.as_khz() % 1_000)
        } else {
            write!(f, "{} Hz", self.0)
        }
    }
}

impl From<Hertz> for u64 {
    fn from(freq: Hertz) -> Self {
        freq.0
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Opaque handle of a clock owned by the clock driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockId(pub u32);

/// Identifier of a switchable power island
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PowergateId(pub u32);

// ============================================================================
// Driver Trait
// ============================================================================

/// Clock and power-rail driver consumed by the controller
///
/// Every method is synchronous and bounded in latency. The controller may
/// call them while holding a domain lock, so implementations must not call
/// back into the controller.
pub trait ClockOps: Send + Sync {
    /// Ungate a clock
    fn enable(&self, clock: ClockId) -> HalResult<()>;

    /// Gate a clock
    fn disable(&self, clock: ClockId) -> HalResult<()>;

    /// Program a rate, returning the rate actually applied
    fn set_rate(&self, clock: ClockId, rate: Hertz) -> HalResult<Hertz>;

    /// Smallest achievable rate not below `requested`, or the highest
    /// achievable rate when `requested` exceeds it
    fn round_rate(&self, clock: ClockId, requested: Hertz) -> HalResult<Hertz>;

    /// Run the power-up sequence of an island whose logic is clocked by `clock`
    ///
    /// On return the island is powered, `clock` is running and the
    /// module is out of reset.
    fn power_island_up(&self, id: PowergateId, clock: ClockId) -> HalResult<()>;

    /// Remove power from an island
    fn power_island_down(&self, id: PowergateId) -> HalResult<()>;

    /// Hold the module clocked by `clock` in reset
    fn assert_reset(&self, clock: ClockId) -> HalResult<()>;

    /// Return a clock handle to the driver at teardown
    fn put(&self, _clock: ClockId) {}
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::string::ToString;

    use super::*;

    #[test]
    fn test_hertz_units() {
        let rate = Hertz::from_mhz(300);
        assert_eq!(rate.as_hz(), 300_000_000);
        assert_eq!(rate.as_khz(), 300_000);
        assert_eq!(rate, Hertz::from_khz(300_000));
        assert!(Hertz::from_mhz(100) < rate);
    }

    #[test]
    fn test_hertz_display() {
        assert_eq!(Hertz::from_khz(166_500).to_string(), "166.500 MHz");
        assert_eq!(Hertz(32_768).to_string(), "32768 Hz");
    }
}
