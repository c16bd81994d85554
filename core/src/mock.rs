//! # Mock Hardware
//!
//! In-memory clock driver, work tracker and power hooks for tests. Every
//! driver call is appended to an event log so tests can assert on the exact
//! hardware sequence.

use std::sync::atomic::{AtomicU32, Ordering};

use hashbrown::{HashMap, HashSet};
use pmdomain_hal::{
    ClockId, ClockOps, CounterId, HalError, HalResult, Hertz, PowerAction, PowerHooks,
    PowergateId, WorkTracker,
};

// ============================================================================
// Clock Driver
// ============================================================================

/// A driver call recorded by [`MockClocks`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum HwEvent {
    Enable(ClockId),
    Disable(ClockId),
    SetRate(ClockId, Hertz),
    Reset(ClockId),
    IslandUp(PowergateId, ClockId),
    IslandDown(PowergateId),
    Put(ClockId),
}

#[derive(Debug, Default)]
struct MockState {
    events: Vec<HwEvent>,
    enabled: HashSet<ClockId>,
    islands: HashSet<PowergateId>,
    rates: HashMap<ClockId, Hertz>,
    failing_clocks: HashSet<ClockId>,
    failing_islands: HashSet<PowergateId>,
    failing_rates: HashSet<ClockId>,
}

/// Clock driver that records calls and fails on demand
#[derive(Debug)]
pub struct MockClocks {
    state: spin::Mutex<MockState>,
    step: u64,
    max_rate: Hertz,
}

impl MockClocks {
    /// Driver that can produce any rate
    pub fn new() -> Self {
        Self::with_step(Hertz(1))
    }

    /// Driver whose rates are multiples of `step`
    pub fn with_step(step: Hertz) -> Self {
        Self {
            state: spin::Mutex::new(MockState::default()),
            step: step.0.max(1),
            max_rate: Hertz(u64::MAX),
        }
    }

    /// Cap the highest achievable rate
    pub fn with_max_rate(mut self, max: Hertz) -> Self {
        self.max_rate = max;
        self
    }

    /// Make every switch of `clock` fail
    pub fn fail_enable(&self, clock: ClockId) {
        self.state.lock().failing_clocks.insert(clock);
    }

    /// Make both directions of island `id` fail
    pub fn fail_island(&self, id: PowergateId) {
        self.state.lock().failing_islands.insert(id);
    }

    /// Make every rate change of `clock` fail
    pub fn fail_rate(&self, clock: ClockId) {
        self.state.lock().failing_rates.insert(clock);
    }

    /// Stop injecting failures
    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.failing_clocks.clear();
        state.failing_islands.clear();
        state.failing_rates.clear();
    }

    /// Every call so far, in order
    pub fn events(&self) -> Vec<HwEvent> {
        self.state.lock().events.clone()
    }

    /// Number of recorded calls matching `pred`
    pub fn count(&self, pred: impl Fn(&HwEvent) -> bool) -> usize {
        self.state.lock().events.iter().filter(|e| pred(e)).count()
    }

    /// Forget recorded calls
    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// Whether `clock` is currently ungated
    pub fn is_enabled(&self, clock: ClockId) -> bool {
        self.state.lock().enabled.contains(&clock)
    }

    /// Whether island `id` is currently powered
    pub fn is_island_up(&self, id: PowergateId) -> bool {
        self.state.lock().islands.contains(&id)
    }

    /// Last rate programmed on `clock`
    pub fn rate(&self, clock: ClockId) -> Option<Hertz> {
        self.state.lock().rates.get(&clock).copied()
    }

    fn round(&self, requested: Hertz) -> Hertz {
        if requested >= self.max_rate {
            return self.max_rate;
        }
        let rounded = requested.0.div_ceil(self.step).saturating_mul(self.step);
        Hertz(rounded.min(self.max_rate.0))
    }
}

impl Default for MockClocks {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockOps for MockClocks {
    fn enable(&self, clock: ClockId) -> HalResult<()> {
        let mut state = self.state.lock();
        if state.failing_clocks.contains(&clock) {
            return Err(HalError::ClockEnable);
        }
        state.events.push(HwEvent::Enable(clock));
        state.enabled.insert(clock);
        Ok(())
    }

    fn disable(&self, clock: ClockId) -> HalResult<()> {
        let mut state = self.state.lock();
        if state.failing_clocks.contains(&clock) {
            return Err(HalError::ClockEnable);
        }
        state.events.push(HwEvent::Disable(clock));
        state.enabled.remove(&clock);
        Ok(())
    }

    fn set_rate(&self, clock: ClockId, rate: Hertz) -> HalResult<Hertz> {
        let applied = self.round(rate);
        let mut state = self.state.lock();
        if state.failing_rates.contains(&clock) {
            return Err(HalError::ClockRate);
        }
        state.events.push(HwEvent::SetRate(clock, applied));
        state.rates.insert(clock, applied);
        Ok(applied)
    }

    fn round_rate(&self, _clock: ClockId, requested: Hertz) -> HalResult<Hertz> {
        Ok(self.round(requested))
    }

    fn power_island_up(&self, id: PowergateId, clock: ClockId) -> HalResult<()> {
        let mut state = self.state.lock();
        if state.failing_islands.contains(&id) || state.failing_clocks.contains(&clock) {
            return Err(HalError::Powergate);
        }
        state.events.push(HwEvent::IslandUp(id, clock));
        state.islands.insert(id);
        state.enabled.insert(clock);
        Ok(())
    }

    fn power_island_down(&self, id: PowergateId) -> HalResult<()> {
        let mut state = self.state.lock();
        if state.failing_islands.contains(&id) {
            return Err(HalError::Powergate);
        }
        state.events.push(HwEvent::IslandDown(id));
        state.islands.remove(&id);
        Ok(())
    }

    fn assert_reset(&self, clock: ClockId) -> HalResult<()> {
        self.state.lock().events.push(HwEvent::Reset(clock));
        Ok(())
    }

    fn put(&self, clock: ClockId) {
        self.state.lock().events.push(HwEvent::Put(clock));
    }
}

// ============================================================================
// Work Tracker
// ============================================================================

/// Work tracker over in-memory counters
#[derive(Debug)]
pub struct MockTracker {
    name: &'static str,
    current: Vec<AtomicU32>,
    expected: Vec<AtomicU32>,
}

impl MockTracker {
    /// Tracker with `counters` counters, all caught up at zero
    pub fn new(name: &'static str, counters: u32) -> Self {
        Self {
            name,
            current: (0..counters).map(|_| AtomicU32::new(0)).collect(),
            expected: (0..counters).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Set both values of a counter
    pub fn set(&self, id: CounterId, current: u32, expected: u32) {
        self.current[id.0 as usize].store(current, Ordering::Release);
        self.expected[id.0 as usize].store(expected, Ordering::Release);
    }

    /// Record submitted work
    pub fn submit(&self, id: CounterId, count: u32) {
        self.expected[id.0 as usize].fetch_add(count, Ordering::AcqRel);
    }

    /// Record completed work
    pub fn complete(&self, id: CounterId, count: u32) {
        self.current[id.0 as usize].fetch_add(count, Ordering::AcqRel);
    }

    /// Value the counter has reached
    pub fn current(&self, id: CounterId) -> u32 {
        self.read_current(id)
    }
}

impl WorkTracker for MockTracker {
    fn name(&self) -> &str {
        self.name
    }

    fn num_counters(&self) -> u32 {
        self.current.len() as u32
    }

    fn read_current(&self, id: CounterId) -> u32 {
        self.current[id.0 as usize].load(Ordering::Acquire)
    }

    fn read_expected(&self, id: CounterId) -> u32 {
        self.expected[id.0 as usize].load(Ordering::Acquire)
    }

    fn force_advance(&self, id: CounterId, by: u32) {
        self.current[id.0 as usize].fetch_add(by, Ordering::AcqRel);
    }
}

// ============================================================================
// Hooks
// ============================================================================

/// Power hooks that record every call and can fail one action
#[derive(Debug, Default)]
pub struct RecordingHooks {
    calls: spin::Mutex<Vec<(String, PowerAction)>>,
    fail_on: spin::Mutex<Option<PowerAction>>,
}

impl RecordingHooks {
    /// Hooks that accept every call
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call reporting `action`
    pub fn fail_on(&self, action: PowerAction) {
        *self.fail_on.lock() = Some(action);
    }

    /// Calls so far, in order
    pub fn calls(&self) -> Vec<(String, PowerAction)> {
        self.calls.lock().clone()
    }
}

impl PowerHooks for RecordingHooks {
    fn on_power_change(&self, domain: &str, action: PowerAction) -> HalResult<()> {
        if *self.fail_on.lock() == Some(action) {
            return Err(HalError::Callback);
        }
        self.calls.lock().push((domain.to_owned(), action));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up_to_step() {
        let clocks = MockClocks::with_step(Hertz::from_mhz(12)).with_max_rate(Hertz::from_mhz(600));
        let clk = ClockId(0);

        assert_eq!(clocks.round_rate(clk, Hertz::from_mhz(100)).unwrap(), Hertz::from_mhz(108));
        assert_eq!(clocks.round_rate(clk, Hertz::from_mhz(108)).unwrap(), Hertz::from_mhz(108));
        assert_eq!(clocks.round_rate(clk, Hertz::from_mhz(900)).unwrap(), Hertz::from_mhz(600));
    }

    #[test]
    fn test_failure_injection() {
        let clocks = MockClocks::new();
        clocks.fail_island(PowergateId(3));

        assert_eq!(clocks.power_island_up(PowergateId(3), ClockId(1)), Err(HalError::Powergate));
        assert!(clocks.events().is_empty());

        clocks.fail_rate(ClockId(2));
        assert_eq!(clocks.set_rate(ClockId(2), Hertz(10)), Err(HalError::ClockRate));
        assert_eq!(clocks.rate(ClockId(2)), None);

        clocks.heal();
        clocks.power_island_up(PowergateId(3), ClockId(1)).unwrap();
        assert!(clocks.is_island_up(PowergateId(3)));
        assert!(clocks.is_enabled(ClockId(1)));
    }

    #[test]
    fn test_tracker_counters() {
        let tracker = MockTracker::new("t", 2);
        tracker.submit(CounterId(1), 5);
        tracker.complete(CounterId(1), 2);
        assert_eq!(tracker.pending(CounterId(1)), 3);
        assert_eq!(tracker.pending(CounterId(0)), 0);
    }
}
