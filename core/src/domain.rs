//! # Power Domains
//!
//! One power-gateable unit: its static description, its lock-protected
//! mutable state and the hardware sequences that switch it.
//!
//! ## State Machine
//!
//! ```text
//!                 acquire                       release to 0
//!   ┌──────┐ ──────────────────▶ ┌────────┐ ──────────────────▶ ┌─────────────┐
//!   │ Idle │                     │ Active │                     │ GracePeriod │
//!   └──────┘ ◀──────────┐        └────────┘ ◀────────────────── └──────┬──────┘
//!      ▲                │                     acquire (cancel)         │
//!      │                └──────────────────────────────────────────────┘
//!      │                           deferred power-down fires
//!      │
//!      │  forced power-down   ┌─────────────────┐
//!      └───────────────────── │ ForceSuspending │ ◀── suspend timeout (any state)
//!                             └─────────────────┘
//! ```
//!
//! ## Invariants
//!
//! - `POWERED` is set whenever `refcount > 0`.
//! - `refcount == 0` with `POWERED` set is the grace period.
//! - While powered, a domain with a parent holds exactly one parent reference.
//! - `child_refs` counts the references held by children and never exceeds
//!   `refcount`. Only a child can drop them.
//! - `STALE` marks a power-down that failed half way. The domain is not
//!   `POWERED`, still holds its parent reference, and the next acquire runs
//!   the full power-on sequence.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use arrayvec::ArrayVec;
use bitflags::bitflags;
use pmdomain_hal::{ClockOps, HalError, Hertz, PowerAction, PowerHooks};

use crate::client::ClientTable;
use crate::config::{ClockDesc, PowerKind, MAX_CLOCKS};
use crate::error::{PmError, PmResult};
use crate::workqueue::WorkHandle;

// =============================================================================
// Identity and Status
// =============================================================================

/// Index of a domain inside its controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DomainId(pub(crate) usize);

impl DomainId {
    /// Position in the controller's domain table
    pub const fn index(&self) -> usize {
        self.0
    }
}

bitflags! {
    /// Status bits of a domain
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DomainFlags: u8 {
        /// Clocks and power island are enabled
        const POWERED         = 1 << 0;
        /// A suspend timeout forced this domain down
        const FORCE_SUSPENDED = 1 << 1;
        /// References are being drained by forced recovery
        const FORCE_DRAINING  = 1 << 2;
        /// A power-down failed part way, hardware state unknown
        const STALE           = 1 << 3;
    }
}

/// Lifecycle state of a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainState {
    /// Unpowered, no references
    Idle,
    /// Powered with outstanding references
    Active,
    /// Powered, no references, power-down pending
    GracePeriod,
    /// References being drained after a suspend timeout
    ForceSuspending,
}

impl DomainState {
    /// Get state name
    pub const fn name(&self) -> &'static str {
        match self {
            DomainState::Idle => "idle",
            DomainState::Active => "active",
            DomainState::GracePeriod => "grace-period",
            DomainState::ForceSuspending => "force-suspending",
        }
    }
}

impl fmt::Display for DomainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Mutable State
// =============================================================================

/// State protected by the domain lock
#[derive(Debug)]
pub(crate) struct DomainInner {
    pub refcount: u32,
    pub child_refs: u32,
    pub flags: DomainFlags,
    pub pending: Option<WorkHandle>,
    pub clients: ClientTable,
    pub rates: ArrayVec<Hertz, MAX_CLOCKS>,
    pub power_on_count: u64,
    pub power_off_count: u64,
}

impl DomainInner {
    pub fn state(&self) -> DomainState {
        if self.flags.contains(DomainFlags::FORCE_DRAINING) {
            DomainState::ForceSuspending
        } else if self.refcount > 0 {
            DomainState::Active
        } else if self.flags.contains(DomainFlags::POWERED) {
            DomainState::GracePeriod
        } else {
            DomainState::Idle
        }
    }

    pub fn is_powered(&self) -> bool {
        self.flags.contains(DomainFlags::POWERED)
    }

    pub fn is_stale(&self) -> bool {
        self.flags.contains(DomainFlags::STALE)
    }

    /// References taken by outside callers
    pub fn own_refs(&self) -> u32 {
        self.refcount.saturating_sub(self.child_refs)
    }

    /// No references and nothing switched on
    pub fn is_off(&self) -> bool {
        self.refcount == 0 && !self.flags.intersects(DomainFlags::POWERED | DomainFlags::STALE)
    }
}

// =============================================================================
// Domain
// =============================================================================

/// A power domain owned by a controller
pub(crate) struct Domain {
    pub name: String,
    pub parent: Option<DomainId>,
    pub depth: usize,
    pub clocks: ArrayVec<ClockDesc, MAX_CLOCKS>,
    pub kind: PowerKind,
    pub powerdown_delay: Duration,
    pub hooks: Option<Arc<dyn PowerHooks>>,
    state: Mutex<DomainInner>,
    idle: Condvar,
}

impl Domain {
    pub fn new(
        name: String,
        parent: Option<DomainId>,
        depth: usize,
        clocks: ArrayVec<ClockDesc, MAX_CLOCKS>,
        kind: PowerKind,
        powerdown_delay: Duration,
        hooks: Option<Arc<dyn PowerHooks>>,
        rates: ArrayVec<Hertz, MAX_CLOCKS>,
    ) -> Self {
        Self {
            name,
            parent,
            depth,
            clocks,
            kind,
            powerdown_delay,
            hooks,
            state: Mutex::new(DomainInner {
                refcount: 0,
                child_refs: 0,
                flags: DomainFlags::empty(),
                pending: None,
                clients: ClientTable::new(),
                rates,
                power_on_count: 0,
                power_off_count: 0,
            }),
            idle: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, DomainInner> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn default_rates(&self) -> ArrayVec<Hertz, MAX_CLOCKS> {
        self.clocks.iter().map(|c| c.default_rate).collect()
    }

    /// Wake everyone blocked in an idle wait
    pub fn notify_idle(&self) {
        self.idle.notify_all();
    }

    /// Block until `done` holds or `deadline` passes; returns whether `done` holds
    pub fn wait_until(
        &self,
        deadline: Option<Instant>,
        done: impl Fn(&DomainInner) -> bool,
    ) -> bool {
        let mut st = self.lock();
        loop {
            if done(&st) {
                return true;
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    st = self
                        .idle
                        .wait_timeout(st, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                },
                None => {
                    st = self.idle.wait(st).unwrap_or_else(PoisonError::into_inner);
                },
            }
        }
    }

    // -------------------------------------------------------------------------
    // Hardware sequences (called with the domain lock held)
    // -------------------------------------------------------------------------

    /// Switch the domain on; on failure nothing is left enabled
    pub fn power_on(&self, ops: &dyn ClockOps, settle: Duration) -> PmResult<()> {
        match self.kind {
            PowerKind::Powergate(id) => {
                let clock = self.clocks[0].id;
                ops.power_island_up(id, clock)
                    .map_err(|e| PmError::from(e).with_domain(&self.name))?;
                if !settle.is_zero() {
                    thread::sleep(settle);
                }
            },
            PowerKind::Clocks => {
                for (i, clock) in self.clocks.iter().enumerate() {
                    if let Err(err) = ops.enable(clock.id) {
                        log::error!("{}: cannot enable clock {}: {}", self.name, clock.name, err);
                        for prev in self.clocks[..i].iter().rev() {
                            if let Err(err) = ops.disable(prev.id) {
                                log::error!("{}: cannot disable clock {}: {}", self.name, prev.name, err);
                            }
                        }
                        return Err(PmError::from(err).with_domain(&self.name));
                    }
                }
            },
        }

        if let Some(hooks) = &self.hooks {
            if let Err(err) = hooks.on_power_change(&self.name, PowerAction::PoweredOn) {
                log::error!("{}: power-on callback failed: {}", self.name, err);
                if let Err(undo) = self.switch_off(ops) {
                    log::error!("{}: cannot undo power-on: {}", self.name, undo.message());
                }
                return Err(PmError::from(err).with_domain(&self.name));
            }
        }

        Ok(())
    }

    /// Tell the owner the domain is about to go down; an error vetoes it
    pub fn announce_power_off(&self) -> PmResult<()> {
        match &self.hooks {
            Some(hooks) => hooks
                .on_power_change(&self.name, PowerAction::PoweredOff)
                .map_err(|e| PmError::from(e).with_domain(&self.name)),
            None => Ok(()),
        }
    }

    /// Gate clocks and island; may stop part way on error
    pub fn switch_off(&self, ops: &dyn ClockOps) -> PmResult<()> {
        match self.kind {
            PowerKind::Clocks => {
                let mut first_err = None;
                for clock in self.clocks.iter().rev() {
                    if let Err(err) = ops.disable(clock.id) {
                        log::error!("{}: cannot disable clock {}: {}", self.name, clock.name, err);
                        first_err.get_or_insert(err);
                    }
                }
                match first_err {
                    Some(err) => Err(PmError::from(err).with_domain(&self.name)),
                    None => Ok(()),
                }
            },
            PowerKind::Powergate(id) => {
                let clock = self.clocks[0].id;
                let wrap = |e: HalError| PmError::from(e).with_domain(&self.name);
                ops.disable(clock).map_err(wrap)?;
                ops.assert_reset(clock).map_err(wrap)?;
                ops.power_island_down(id).map_err(wrap)
            },
        }
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("kind", &self.kind)
            .field("clocks", &self.clocks.len())
            .finish()
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time view of a domain, for debug dumps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSnapshot {
    /// Domain name
    pub name: String,
    /// Parent name
    pub parent: Option<String>,
    /// Outstanding references
    pub refcount: u32,
    /// Status bits
    pub flags: DomainFlags,
    /// Lifecycle state
    pub state: DomainState,
    /// Rates currently applied, per clock
    pub rates: Vec<Hertz>,
    /// Registered clients
    pub clients: usize,
    /// Physical power-ups since init
    pub power_on_count: u64,
    /// Physical power-downs since init
    pub power_off_count: u64,
}

impl fmt::Display for DomainSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} refs={:<3} state={:<16} clients={} on={} off={}",
            self.name,
            self.refcount,
            self.state.name(),
            self.clients,
            self.power_on_count,
            self.power_off_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inner(refcount: u32, flags: DomainFlags) -> DomainInner {
        DomainInner {
            refcount,
            child_refs: 0,
            flags,
            pending: None,
            clients: ClientTable::new(),
            rates: ArrayVec::new(),
            power_on_count: 0,
            power_off_count: 0,
        }
    }

    #[test]
    fn test_state_derivation() {
        assert_eq!(inner(0, DomainFlags::empty()).state(), DomainState::Idle);
        assert_eq!(inner(2, DomainFlags::POWERED).state(), DomainState::Active);
        assert_eq!(inner(0, DomainFlags::POWERED).state(), DomainState::GracePeriod);
        assert_eq!(
            inner(3, DomainFlags::POWERED | DomainFlags::FORCE_DRAINING).state(),
            DomainState::ForceSuspending
        );
    }

    #[test]
    fn test_is_off() {
        assert!(inner(0, DomainFlags::empty()).is_off());
        assert!(!inner(0, DomainFlags::POWERED).is_off());
        assert!(!inner(1, DomainFlags::POWERED).is_off());
        assert!(!inner(0, DomainFlags::STALE).is_off());
    }

    #[test]
    fn test_own_refs_exclude_children() {
        let mut st = inner(3, DomainFlags::POWERED);
        st.child_refs = 2;
        assert_eq!(st.own_refs(), 1);
        st.child_refs = 3;
        assert_eq!(st.own_refs(), 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(DomainState::GracePeriod.to_string(), "grace-period");
    }
}
