//! # Suspend and Forced Recovery
//!
//! Brings a set of domains to the unpowered state, forcing it when clients
//! leak references.
//!
//! ```text
//!   suspend(domain, system_wide)
//!     │
//!     ├─ 1. for each domain in the set, deepest first:
//!     │        wait (bounded) until only its children hold it
//!     │          └─ timeout ─▶ dump state once, raise force-suspend,
//!     │                        drain the leaked references
//!     │        cancel the deferred task, power down synchronously
//!     │
//!     ├─ 2. wait (same bound) until every domain is unpowered
//!     │        └─ timeout ─▶ ForcedIdleFailed
//!     │
//!     └─ 3. system-wide only: advance lagging work-tracker counters
//! ```
//!
//! A subtree suspend covers the named domain and all its descendants. A
//! system-wide suspend covers the whole forest.

use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use pmdomain_hal::{CounterId, WorkTracker};

use crate::controller::Inner;
use crate::domain::{DomainFlags, DomainId};
use crate::error::{ErrorKind, PmError, PmResult};

// =============================================================================
// REPORT
// =============================================================================

/// A work-tracker counter that had to be advanced by hand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerFixup {
    /// Tracker name
    pub tracker: String,
    /// Counter that lagged
    pub counter: CounterId,
    /// Value the hardware had reached
    pub current: u32,
    /// Value it should have reached
    pub expected: u32,
    /// Amount the counter was advanced by
    pub advanced_by: u32,
}

/// Outcome of a successful suspend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuspendReport {
    /// Domains covered
    pub domains: usize,
    /// Domains whose references had to be drained by force
    pub forced: Vec<String>,
    /// Counters advanced during a system-wide suspend
    pub tracker_fixups: Vec<TrackerFixup>,
}

impl SuspendReport {
    /// Whether any domain had to be forced
    pub fn was_forced(&self) -> bool {
        !self.forced.is_empty()
    }
}

/// Clears the force-suspend flag when dropped
struct ForceSuspendGuard<'a>(&'a AtomicBool);

impl<'a> ForceSuspendGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ForceSuspendGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// SUSPEND
// =============================================================================

impl Inner {
    /// Suspend the subtree under `root`, or the whole forest when
    /// `system_wide` is set or `root` is `None`
    pub(crate) fn suspend(&self, root: Option<DomainId>, system_wide: bool) -> PmResult<SuspendReport> {
        let set = self.suspend_set(root, system_wide);
        let timeout = self.config.suspend_timeout;
        let mut report = SuspendReport {
            domains: set.len(),
            ..SuspendReport::default()
        };
        log::debug!("pmdomain: suspending {} domain(s), system_wide={}", set.len(), system_wide);

        let deadline = Instant::now() + timeout;
        let mut force: Option<ForceSuspendGuard<'_>> = None;

        for &id in &set {
            let d = &self.domains[id.0];

            if !d.wait_until(Some(deadline), |st| st.own_refs() == 0) {
                if force.is_none() {
                    log::warn!("{}: still busy after {:?}, forcing idle", d.name, timeout);
                    for snap in self.snapshot() {
                        log::warn!("  {}", snap);
                    }
                    force = Some(ForceSuspendGuard::raise(&self.force_suspend));
                }
                if self.force_release(id) {
                    report.forced.push(d.name.clone());
                }
            }
            self.flush_powerdown(id);
        }
        drop(force);

        let deadline = Instant::now() + timeout;
        let stuck: Vec<&str> = set
            .iter()
            .map(|id| &self.domains[id.0])
            .filter(|d| !d.wait_until(Some(deadline), |st| st.is_off()))
            .map(|d| d.name.as_str())
            .collect();

        if let Some(first) = stuck.first() {
            let names = stuck.join(", ");
            log::error!("pmdomain: still powered after forced idle: {}", names);
            return Err(PmError::from_kind(ErrorKind::ForcedIdleFailed)
                .with_details(names)
                .with_domain(first));
        }

        if system_wide {
            report.tracker_fixups = self.reconcile_trackers();
        }

        log::info!(
            "pmdomain: suspended {} domain(s), {} forced, {} counter fixup(s)",
            report.domains,
            report.forced.len(),
            report.tracker_fixups.len()
        );
        Ok(report)
    }

    /// Domains covered by a suspend, deepest first
    fn suspend_set(&self, root: Option<DomainId>, system_wide: bool) -> Vec<DomainId> {
        let mut set: Vec<DomainId> = (0..self.domains.len())
            .map(DomainId)
            .filter(|&id| match root {
                Some(root) if !system_wide => self.is_within(id, root),
                _ => true,
            })
            .collect();
        set.sort_by_key(|id| Reverse(self.domains[id.0].depth));
        set
    }

    /// Whether `id` is `root` or one of its descendants
    fn is_within(&self, id: DomainId, root: DomainId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == root {
                return true;
            }
            cur = self.domains[c.0].parent;
        }
        false
    }

    /// Drop every reference not held by a child; false if there were none
    fn force_release(&self, id: DomainId) -> bool {
        let d = &self.domains[id.0];
        let mut st = d.lock();
        let leaked = st.own_refs();
        if leaked == 0 {
            return false;
        }

        log::warn!("{}: forcing release of {} reference(s)", d.name, leaked);
        st.flags.insert(DomainFlags::FORCE_SUSPENDED | DomainFlags::FORCE_DRAINING);
        self.drop_refs(id, d, &mut st, leaked);
        true
    }

    /// Run a pending power-down now instead of after the coalescing window
    fn flush_powerdown(&self, id: DomainId) {
        let d = &self.domains[id.0];
        let mut st = d.lock();
        if let Some(handle) = st.pending.take() {
            self.queue.cancel(handle);
        }
        if let Err(err) = self.power_down_locked(d, &mut st) {
            log::error!("{}: power-down during suspend failed: {}", d.name, err);
        }
        st.flags.remove(DomainFlags::FORCE_DRAINING);
    }

    /// Advance every counter that lags its expected value
    fn reconcile_trackers(&self) -> Vec<TrackerFixup> {
        let trackers: Vec<Arc<dyn WorkTracker>> = self.trackers.read().clone();
        let mut fixups = Vec::new();

        for tracker in &trackers {
            for n in 0..tracker.num_counters() {
                let counter = CounterId(n);
                let behind = tracker.pending(counter);
                if behind == 0 {
                    continue;
                }

                let current = tracker.read_current(counter);
                let expected = tracker.read_expected(counter);
                log::warn!(
                    "{}: counter {} at {}, expected {}; advancing by {}",
                    tracker.name(),
                    n,
                    current,
                    expected,
                    behind
                );
                tracker.force_advance(counter, behind);
                fixups.push(TrackerFixup {
                    tracker: tracker.name().to_owned(),
                    counter,
                    current,
                    expected,
                    advanced_by: behind,
                });
            }
        }
        fixups
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use pmdomain_hal::{ClockId, HalResult, Hertz, PowerAction, PowerHooks, PowergateId};

    use super::*;
    use crate::client::ClientId;
    use crate::config::{ClockDesc, ControllerConfig, DomainDesc};
    use crate::controller::PowerDomainController;
    use crate::domain::DomainState;
    use crate::mock::{HwEvent, MockClocks, MockTracker};

    const HOST1X_CLK: ClockId = ClockId(0);
    const GR3D_PG: PowergateId = PowergateId(1);
    const MPE_PG: PowergateId = PowergateId(2);

    fn forest(clocks: &Arc<MockClocks>, delay: Duration, timeout: Duration) -> PowerDomainController {
        PowerDomainController::builder(clocks.clone())
            .config(
                ControllerConfig::default()
                    .powerdown_delay(delay)
                    .suspend_timeout(timeout)
                    .powergate_settle(Duration::ZERO),
            )
            .domain(
                DomainDesc::new("host1x")
                    .clock(ClockDesc::new(HOST1X_CLK, "host1x", Hertz::from_mhz(108))),
            )
            .domain(
                DomainDesc::new("gr3d")
                    .parent("host1x")
                    .clock(ClockDesc::new(ClockId(1), "gr3d", Hertz::from_mhz(100)))
                    .powergate(GR3D_PG),
            )
            .domain(
                DomainDesc::new("mpe")
                    .parent("host1x")
                    .clock(ClockDesc::new(ClockId(2), "mpe", Hertz::from_mhz(100)))
                    .powergate(MPE_PG),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_suspend_flushes_grace_period() {
        let clocks = Arc::new(MockClocks::new());
        let ctl = forest(&clocks, Duration::from_secs(30), Duration::from_millis(200));
        let gr3d = ctl.domain_id("gr3d").unwrap();

        ctl.acquire(gr3d).unwrap();
        ctl.release(gr3d).unwrap();
        assert_eq!(ctl.state(gr3d).unwrap(), DomainState::GracePeriod);

        let report = ctl.suspend(gr3d, false).unwrap();
        assert!(!report.was_forced());
        assert_eq!(report.domains, 1);
        assert!(!ctl.is_powered(gr3d).unwrap());
        assert!(!clocks.is_island_up(GR3D_PG));
        assert!(!ctl.is_force_suspended(gr3d).unwrap());
    }

    #[test]
    fn test_suspend_forces_leaked_references() {
        let clocks = Arc::new(MockClocks::new());
        let timeout = Duration::from_millis(50);
        let ctl = forest(&clocks, Duration::from_millis(5), timeout);
        let gr3d = ctl.domain_id("gr3d").unwrap();

        for _ in 0..3 {
            ctl.acquire(gr3d).unwrap();
        }

        let start = Instant::now();
        let report = ctl.suspend(gr3d, false).unwrap();
        assert!(start.elapsed() >= timeout);

        assert_eq!(report.forced, vec!["gr3d".to_string()]);
        assert_eq!(ctl.refcount(gr3d).unwrap(), 0);
        assert!(!ctl.is_powered(gr3d).unwrap());
        assert!(ctl.is_force_suspended(gr3d).unwrap());
        assert_eq!(ctl.state(gr3d).unwrap(), DomainState::Idle);

        ctl.acquire(gr3d).unwrap();
        assert!(!ctl.is_force_suspended(gr3d).unwrap());
        ctl.release(gr3d).unwrap();
    }

    #[test]
    fn test_suspend_waits_for_release() {
        let clocks = Arc::new(MockClocks::new());
        let ctl = Arc::new(forest(&clocks, Duration::from_millis(5), Duration::from_secs(5)));
        let gr3d = ctl.domain_id("gr3d").unwrap();

        ctl.acquire(gr3d).unwrap();
        let releaser = {
            let ctl = Arc::clone(&ctl);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                ctl.release(gr3d).unwrap();
            })
        };

        let report = ctl.suspend(gr3d, false).unwrap();
        releaser.join().unwrap();
        assert!(!report.was_forced());
        assert!(!ctl.is_powered(gr3d).unwrap());
    }

    #[test]
    fn test_subtree_suspend_deepest_first() {
        let clocks = Arc::new(MockClocks::new());
        let ctl = forest(&clocks, Duration::from_secs(30), Duration::from_millis(50));
        let host1x = ctl.domain_id("host1x").unwrap();
        let gr3d = ctl.domain_id("gr3d").unwrap();
        let mpe = ctl.domain_id("mpe").unwrap();

        ctl.acquire(gr3d).unwrap();
        ctl.acquire(mpe).unwrap();
        ctl.release(mpe).unwrap();
        clocks.clear_events();

        let report = ctl.suspend(host1x, false).unwrap();
        assert_eq!(report.domains, 3);
        assert_eq!(report.forced, vec!["gr3d".to_string()]);

        for id in [host1x, gr3d, mpe] {
            assert!(!ctl.is_powered(id).unwrap());
        }

        let events = clocks.events();
        let parent_off = events
            .iter()
            .position(|e| *e == HwEvent::Disable(HOST1X_CLK))
            .unwrap();
        for pg in [GR3D_PG, MPE_PG] {
            let child_off = events.iter().position(|e| *e == HwEvent::IslandDown(pg)).unwrap();
            assert!(child_off < parent_off);
        }
    }

    #[test]
    fn test_subtree_suspend_leaves_siblings() {
        let clocks = Arc::new(MockClocks::new());
        let ctl = forest(&clocks, Duration::from_millis(5), Duration::from_millis(50));
        let host1x = ctl.domain_id("host1x").unwrap();
        let gr3d = ctl.domain_id("gr3d").unwrap();
        let mpe = ctl.domain_id("mpe").unwrap();

        ctl.acquire(gr3d).unwrap();
        ctl.acquire(mpe).unwrap();

        let report = ctl.suspend(mpe, false).unwrap();
        assert_eq!(report.forced, vec!["mpe".to_string()]);
        assert!(ctl.is_powered(gr3d).unwrap());
        assert!(ctl.is_powered(host1x).unwrap());
        assert_eq!(ctl.refcount(host1x).unwrap(), 1);

        ctl.release(gr3d).unwrap();
    }

    #[test]
    fn test_system_suspend_reconciles_trackers() {
        let clocks = Arc::new(MockClocks::new());
        let tracker = Arc::new(MockTracker::new("syncpt", 4));
        tracker.set(CounterId(2), 7, 10);
        tracker.set(CounterId(3), 5, 5);

        let ctl = forest(&clocks, Duration::from_millis(5), Duration::from_millis(50));
        ctl.register_work_tracker(tracker.clone());
        let gr3d = ctl.domain_id("gr3d").unwrap();
        let mpe = ctl.domain_id("mpe").unwrap();

        ctl.acquire(gr3d).unwrap();
        ctl.set_client_rate(mpe, ClientId(1), 0, Hertz::from_mhz(200)).unwrap();

        let report = ctl.suspend(mpe, true).unwrap();
        assert_eq!(report.domains, 3);
        assert_eq!(report.forced, vec!["gr3d".to_string()]);
        assert_eq!(
            report.tracker_fixups,
            vec![TrackerFixup {
                tracker: "syncpt".to_string(),
                counter: CounterId(2),
                current: 7,
                expected: 10,
                advanced_by: 3,
            }]
        );
        assert_eq!(tracker.current(CounterId(2)), 10);
        assert_eq!(tracker.pending(CounterId(2)), 0);

        for id in ctl.domain_ids() {
            assert!(!ctl.is_powered(id).unwrap());
        }
        // rates survive a suspend
        assert_eq!(ctl.get_rate(mpe, 0).unwrap(), Hertz::from_mhz(200));
    }

    #[test]
    fn test_subtree_suspend_skips_trackers() {
        let clocks = Arc::new(MockClocks::new());
        let tracker = Arc::new(MockTracker::new("syncpt", 1));
        tracker.set(CounterId(0), 1, 4);

        let ctl = PowerDomainController::builder(clocks.clone())
            .config(ControllerConfig::default().suspend_timeout(Duration::from_millis(50)))
            .domain(
                DomainDesc::new("host1x")
                    .clock(ClockDesc::new(HOST1X_CLK, "host1x", Hertz::from_mhz(108))),
            )
            .work_tracker(tracker.clone())
            .build()
            .unwrap();
        let host1x = ctl.domain_id("host1x").unwrap();

        let report = ctl.suspend(host1x, false).unwrap();
        assert!(report.tracker_fixups.is_empty());
        assert_eq!(tracker.current(CounterId(0)), 1);

        let report = ctl.suspend_all().unwrap();
        assert_eq!(report.tracker_fixups.len(), 1);
        assert_eq!(tracker.current(CounterId(0)), 4);
    }

    #[test]
    fn test_tracker_wraparound() {
        let clocks = Arc::new(MockClocks::new());
        let tracker = Arc::new(MockTracker::new("syncpt", 1));
        tracker.set(CounterId(0), u32::MAX - 1, 3);

        let ctl = forest(&clocks, Duration::from_millis(5), Duration::from_millis(50));
        ctl.register_work_tracker(tracker.clone());

        let report = ctl.suspend_all().unwrap();
        assert_eq!(report.tracker_fixups[0].advanced_by, 5);
        assert_eq!(tracker.current(CounterId(0)), 3);
    }

    #[test]
    fn test_forced_idle_failure() {
        let clocks = Arc::new(MockClocks::new());
        let ctl = forest(&clocks, Duration::from_millis(5), Duration::from_millis(30));
        let gr3d = ctl.domain_id("gr3d").unwrap();

        ctl.acquire(gr3d).unwrap();
        clocks.fail_island(GR3D_PG);

        let err = ctl.suspend(gr3d, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ForcedIdleFailed);
        assert!(err.is_critical());
        assert_eq!(err.domain(), Some("gr3d"));
        assert!(!ctl.is_powered(gr3d).unwrap());
        assert!(clocks.is_island_up(GR3D_PG));
        // gr3d keeps host1x up until its island is really down
        let host1x = ctl.domain_id("host1x").unwrap();
        assert!(ctl.is_powered(host1x).unwrap());

        clocks.heal();
        let report = ctl.suspend(host1x, false).unwrap();
        assert!(!report.was_forced());
        assert!(!clocks.is_island_up(GR3D_PG));
        assert!(!ctl.is_powered(host1x).unwrap());
        assert_eq!(ctl.refcount(host1x).unwrap(), 0);
    }

    /// Stalls every power-off, to hold a suspend inside its forced phase
    struct SlowPowerOff(Duration);

    impl PowerHooks for SlowPowerOff {
        fn on_power_change(&self, _domain: &str, action: PowerAction) -> HalResult<()> {
            if action == PowerAction::PoweredOff {
                thread::sleep(self.0);
            }
            Ok(())
        }
    }

    #[test]
    fn test_sibling_powers_down_after_forced_subtree() {
        let clocks = Arc::new(MockClocks::new());
        let ctl = Arc::new(
            PowerDomainController::builder(clocks.clone())
                .config(
                    ControllerConfig::default()
                        .powerdown_delay(Duration::from_millis(10))
                        .suspend_timeout(Duration::from_millis(30))
                        .powergate_settle(Duration::ZERO),
                )
                .domain(
                    DomainDesc::new("host1x")
                        .clock(ClockDesc::new(HOST1X_CLK, "host1x", Hertz::from_mhz(108))),
                )
                .domain(
                    DomainDesc::new("gr3d")
                        .parent("host1x")
                        .clock(ClockDesc::new(ClockId(1), "gr3d", Hertz::from_mhz(100)))
                        .powergate(GR3D_PG)
                        .hooks(Arc::new(SlowPowerOff(Duration::from_millis(80)))),
                )
                .domain(
                    DomainDesc::new("mpe")
                        .parent("host1x")
                        .clock(ClockDesc::new(ClockId(2), "mpe", Hertz::from_mhz(100)))
                        .powergate(MPE_PG),
                )
                .build()
                .unwrap(),
        );
        let host1x = ctl.domain_id("host1x").unwrap();
        let gr3d = ctl.domain_id("gr3d").unwrap();
        let mpe = ctl.domain_id("mpe").unwrap();

        ctl.acquire(gr3d).unwrap();
        ctl.acquire(mpe).unwrap();

        // mpe goes idle while gr3d is being forced down
        let releaser = {
            let ctl = Arc::clone(&ctl);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(45));
                ctl.release(mpe).unwrap();
            })
        };

        let report = ctl.suspend(gr3d, false).unwrap();
        releaser.join().unwrap();
        assert_eq!(report.forced, vec!["gr3d".to_string()]);

        assert!(ctl.wait_idle(mpe, Duration::from_secs(2)).unwrap());
        assert!(!clocks.is_island_up(MPE_PG));
        assert!(ctl.wait_idle(host1x, Duration::from_secs(2)).unwrap());
    }

    #[test]
    fn test_suspend_all_idle_forest() {
        let clocks = Arc::new(MockClocks::new());
        let ctl = forest(&clocks, Duration::from_millis(5), Duration::from_millis(50));

        let report = ctl.suspend_all().unwrap();
        assert_eq!(report, SuspendReport {
            domains: 3,
            ..SuspendReport::default()
        });
    }
}
