//! # Power Domain Controller
//!
//! Owns the domain forest and drives every domain through its lifecycle.
//!
//! ## Acquire / Release Flow
//!
//! ```text
//!   acquire(child)                           release(child) → refcount 0
//!     │                                        │
//!     ├─ cancel pending power-down             └─ schedule power-down ──┐
//!     ├─ acquire(parent)      ◀── recursive                             │
//!     ├─ power island / clocks on                            coalescing window
//!     └─ hooks: PoweredOn                                               │
//!                                                                       ▼
//!                                              deferred power-down (worker thread)
//!                                                ├─ re-check refcount == 0
//!                                                ├─ hooks: PoweredOff
//!                                                ├─ clocks / power island off
//!                                                └─ release(parent)
//! ```
//!
//! ## Locking
//!
//! Each domain has its own lock, held across the bounded hardware calls of
//! a transition. A child's lock may be held while the parent's lock is
//! taken, never the reverse. Since the forest is a tree, no lock cycle can
//! form. The work queue's lock is a leaf and is never held while a job runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use arrayvec::ArrayVec;
use hashbrown::HashMap;
use pmdomain_hal::{ClockOps, Hertz, PowerHooks, WorkTracker};

use crate::client::ClientId;
use crate::config::{ControllerConfig, DomainDesc, PowerKind, MAX_CLOCKS};
use crate::domain::{Domain, DomainFlags, DomainId, DomainInner, DomainSnapshot, DomainState};
use crate::error::{ErrorKind, PmError, PmResult};
use crate::suspend::SuspendReport;
use crate::workqueue::{DelayedWorkQueue, Work, WorkHandle, WorkQueueStats};

// =============================================================================
// BUILDER
// =============================================================================

/// Collects the configuration, domains and work trackers of a controller
pub struct ControllerBuilder {
    ops: Arc<dyn ClockOps>,
    config: ControllerConfig,
    domains: Vec<DomainDesc>,
    trackers: Vec<Arc<dyn WorkTracker>>,
}

impl ControllerBuilder {
    /// Start a builder around a clock driver
    pub fn new(ops: Arc<dyn ClockOps>) -> Self {
        Self {
            ops,
            config: ControllerConfig::default(),
            domains: Vec::new(),
            trackers: Vec::new(),
        }
    }

    /// Replace the timing configuration
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Declare a domain
    pub fn domain(mut self, desc: DomainDesc) -> Self {
        self.domains.push(desc);
        self
    }

    /// Declare several domains
    pub fn domains(mut self, descs: impl IntoIterator<Item = DomainDesc>) -> Self {
        self.domains.extend(descs);
        self
    }

    /// Register an outstanding-work tracker checked at system suspend
    pub fn work_tracker(mut self, tracker: Arc<dyn WorkTracker>) -> Self {
        self.trackers.push(tracker);
        self
    }

    /// Validate the forest, program default rates, gate every power island
    /// and start the power-down worker
    pub fn build(self) -> PmResult<PowerDomainController> {
        let parents = resolve_parents(&self.domains)?;
        let depths = compute_depths(&self.domains, &parents)?;

        let mut domains = Vec::with_capacity(self.domains.len());
        for (i, desc) in self.domains.into_iter().enumerate() {
            let mut rates = ArrayVec::<Hertz, MAX_CLOCKS>::new();
            for clock in &desc.clocks {
                let applied = self
                    .ops
                    .set_rate(clock.id, clock.default_rate)
                    .map_err(|e| PmError::from(e).with_domain(&desc.name))?;
                rates.push(applied);
            }
            if let PowerKind::Powergate(id) = desc.kind {
                self.ops
                    .power_island_down(id)
                    .map_err(|e| PmError::from(e).with_domain(&desc.name))?;
            }

            let delay = desc.powerdown_delay.unwrap_or(self.config.powerdown_delay);
            let clocks = desc.clocks.iter().copied().collect();
            log::debug!(
                "{}: registered ({} clock(s), parent {:?})",
                desc.name,
                desc.clocks.len(),
                desc.parent
            );
            domains.push(Domain::new(
                desc.name,
                parents[i].map(DomainId),
                depths[i],
                clocks,
                desc.kind,
                delay,
                desc.hooks,
                rates,
            ));
        }

        let queue = DelayedWorkQueue::start(&self.config.worker_name)?;
        let ops = self.ops;
        let config = self.config;
        let trackers = self.trackers;

        let inner = Arc::new_cyclic(|weak| Inner {
            weak: weak.clone(),
            domains,
            ops,
            config,
            queue,
            trackers: spin::RwLock::new(trackers),
            force_suspend: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        });

        log::info!("pmdomain: controller up with {} domain(s)", inner.domains.len());
        Ok(PowerDomainController { inner })
    }
}

impl core::fmt::Debug for ControllerBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControllerBuilder")
            .field("config", &self.config)
            .field("domains", &self.domains)
            .field("trackers", &self.trackers.len())
            .finish()
    }
}

fn config_error(kind: ErrorKind, name: &str, details: &str) -> PmError {
    PmError::from_kind(kind).with_details(details).with_domain(name)
}

fn resolve_parents(descs: &[DomainDesc]) -> PmResult<Vec<Option<usize>>> {
    let mut by_name: HashMap<&str, usize> = HashMap::with_capacity(descs.len());

    for (i, desc) in descs.iter().enumerate() {
        if by_name.insert(desc.name(), i).is_some() {
            return Err(config_error(ErrorKind::DuplicateDomain, desc.name(), "name already declared"));
        }
        if desc.clocks.is_empty() {
            return Err(config_error(ErrorKind::InvalidConfig, desc.name(), "domain has no clocks"));
        }
        if desc.clocks.len() > MAX_CLOCKS {
            return Err(config_error(
                ErrorKind::InvalidConfig,
                desc.name(),
                "too many clocks",
            ));
        }
        if matches!(desc.kind, PowerKind::Powergate(_)) && desc.clocks.len() != 1 {
            return Err(config_error(
                ErrorKind::InvalidConfig,
                desc.name(),
                "power-gated domain needs exactly one clock",
            ));
        }
    }

    descs
        .iter()
        .map(|desc| match desc.parent_name() {
            None => Ok(None),
            Some(parent) => by_name
                .get(parent)
                .copied()
                .map(Some)
                .ok_or_else(|| config_error(ErrorKind::UnknownParent, desc.name(), parent)),
        })
        .collect()
}

fn compute_depths(descs: &[DomainDesc], parents: &[Option<usize>]) -> PmResult<Vec<usize>> {
    let mut depths = Vec::with_capacity(parents.len());
    for (i, desc) in descs.iter().enumerate() {
        let mut depth = 0;
        let mut cur = parents[i];
        while let Some(p) = cur {
            depth += 1;
            if depth > parents.len() {
                return Err(config_error(ErrorKind::ParentCycle, desc.name(), "parent chain loops"));
            }
            cur = parents[p];
        }
        depths.push(depth);
    }
    Ok(depths)
}

// =============================================================================
// SHARED STATE
// =============================================================================

pub(crate) struct Inner {
    weak: Weak<Inner>,
    pub domains: Vec<Domain>,
    pub ops: Arc<dyn ClockOps>,
    pub config: ControllerConfig,
    pub queue: DelayedWorkQueue,
    pub trackers: spin::RwLock<Vec<Arc<dyn WorkTracker>>>,
    pub force_suspend: AtomicBool,
    pub shut_down: AtomicBool,
}

impl Inner {
    pub fn domain(&self, id: DomainId) -> PmResult<&Domain> {
        self.domains.get(id.0).ok_or_else(|| {
            PmError::from_kind(ErrorKind::NotFound).with_details(format!("domain #{}", id.0))
        })
    }

    // -------------------------------------------------------------------------
    // Reference counting
    // -------------------------------------------------------------------------

    pub fn acquire(&self, id: DomainId) -> PmResult<()> {
        self.acquire_ref(id, false)
    }

    /// Take a reference; `for_child` marks the one a powered child holds
    fn acquire_ref(&self, id: DomainId, for_child: bool) -> PmResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(PmError::from_kind(ErrorKind::ShutDown));
        }
        let d = self.domain(id)?;
        let mut st = d.lock();

        if st.refcount == 0 {
            if let Some(handle) = st.pending.take() {
                self.queue.cancel(handle);
            }
            if !st.is_powered() {
                self.power_up_locked(d, &mut st)?;
            }
        }

        st.flags.remove(DomainFlags::FORCE_SUSPENDED);
        st.refcount += 1;
        if for_child {
            st.child_refs += 1;
        }
        log::trace!("{}: acquire, refcount {}", d.name, st.refcount);
        Ok(())
    }

    /// Power the parent chain, then the domain itself
    fn power_up_locked(&self, d: &Domain, st: &mut DomainInner) -> PmResult<()> {
        // a stale domain kept its parent reference
        let parent = d.parent.filter(|_| !st.is_stale());
        if let Some(parent) = parent {
            self.acquire_ref(parent, true)?;
        }

        if let Err(err) = d.power_on(self.ops.as_ref(), self.config.powergate_settle) {
            log::error!("{}: cannot power on: {}", d.name, err);
            if let Some(parent) = parent {
                if let Err(undo) = self.release_ref(parent, 1, true) {
                    log::error!("{}: cannot drop parent reference: {}", d.name, undo);
                }
            }
            return Err(err);
        }

        st.flags.remove(DomainFlags::STALE);
        st.flags.insert(DomainFlags::POWERED);
        st.power_on_count += 1;
        log::debug!("{}: powered on", d.name);
        Ok(())
    }

    pub fn release(&self, id: DomainId, count: u32) -> PmResult<()> {
        self.release_ref(id, count, false)
    }

    /// Drop references of one kind; the other kind is never touched
    fn release_ref(&self, id: DomainId, count: u32, for_child: bool) -> PmResult<()> {
        let d = self.domain(id)?;
        if count == 0 {
            return Err(PmError::from_kind(ErrorKind::InvalidArgument)
                .with_details("release of zero references")
                .with_domain(&d.name));
        }

        let mut st = d.lock();
        let held = if for_child { st.child_refs } else { st.own_refs() };
        if count > held {
            log::error!(
                "{}: release of {} with {} held (refcount {})",
                d.name,
                count,
                held,
                st.refcount
            );
            return Err(PmError::from_kind(ErrorKind::RefcountUnderflow)
                .with_details(format!("release {} with {} held", count, held))
                .with_domain(&d.name));
        }

        if for_child {
            st.child_refs -= count;
        }
        self.drop_refs(id, d, &mut st, count);
        Ok(())
    }

    /// Drop `count` references already checked against the refcount
    pub fn drop_refs(&self, id: DomainId, d: &Domain, st: &mut DomainInner, count: u32) {
        st.refcount -= count;
        log::trace!("{}: release {}, refcount {}", d.name, count, st.refcount);

        if st.refcount == 0 {
            if st.is_powered() && st.pending.is_none() {
                self.schedule_powerdown(id, d, st);
            }
            d.notify_idle();
        }
    }

    fn schedule_powerdown(&self, id: DomainId, d: &Domain, st: &mut DomainInner) {
        let weak = self.weak.clone();
        let work: Work = Box::new(move |handle: WorkHandle| {
            if let Some(inner) = weak.upgrade() {
                inner.deferred_powerdown(id, handle);
            }
        });

        match self.queue.schedule(d.powerdown_delay, work) {
            Ok(handle) => st.pending = Some(handle),
            Err(_) => {
                // worker stopped, nothing left to coalesce with
                if let Err(err) = self.power_down_locked(d, st) {
                    log::error!("{}: power-down failed: {}", d.name, err);
                }
            },
        }
    }

    fn deferred_powerdown(&self, id: DomainId, handle: WorkHandle) {
        let Ok(d) = self.domain(id) else {
            return;
        };
        let mut st = d.lock();

        if st.pending != Some(handle) {
            return;
        }
        st.pending = None;

        if self.force_suspend.load(Ordering::Acquire) {
            log::warn!("{}: forced suspend in progress, deferred power-down postponed", d.name);
            self.schedule_powerdown(id, d, &mut st);
            return;
        }

        if let Err(err) = self.power_down_locked(d, &mut st) {
            log::error!("{}: deferred power-down failed: {}", d.name, err);
        }
    }

    /// Switch an unreferenced domain off and drop its parent reference
    ///
    /// Returns false when the domain was referenced or already off. A vetoing
    /// hook leaves the domain powered. A driver failure part way leaves it
    /// `STALE`, still holding its parent; a later call retries the switch-off.
    pub fn power_down_locked(&self, d: &Domain, st: &mut DomainInner) -> PmResult<bool> {
        if st.refcount != 0 {
            return Ok(false);
        }
        if st.is_powered() {
            d.announce_power_off()?;
        } else if !st.is_stale() {
            return Ok(false);
        }

        st.flags.remove(DomainFlags::POWERED);
        if let Err(err) = d.switch_off(self.ops.as_ref()) {
            st.flags.insert(DomainFlags::STALE);
            d.notify_idle();
            return Err(err);
        }
        st.flags.remove(DomainFlags::STALE);
        st.power_off_count += 1;
        log::debug!("{}: powered off", d.name);
        d.notify_idle();

        if let Some(parent) = d.parent {
            if let Err(err) = self.release_ref(parent, 1, true) {
                log::error!("{}: cannot drop parent reference: {}", d.name, err);
            }
        }
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Client rates
    // -------------------------------------------------------------------------

    fn clock_index(d: &Domain, index: usize) -> PmResult<()> {
        if index < d.clocks.len() {
            Ok(())
        } else {
            Err(PmError::from_kind(ErrorKind::InvalidArgument)
                .with_details(format!("clock index {} out of {}", index, d.clocks.len()))
                .with_domain(&d.name))
        }
    }

    /// Program clock `index` with the maximum of all client requests
    fn apply_rate(&self, d: &Domain, st: &mut DomainInner, index: usize) -> PmResult<Hertz> {
        let clock = d.clocks[index];
        let target = st.clients.effective(index, clock.default_rate);
        let applied = self
            .ops
            .set_rate(clock.id, target)
            .map_err(|e| PmError::from(e).with_domain(&d.name))?;

        if st.rates[index] != applied {
            log::debug!("{}: clock {} {} -> {}", d.name, clock.name, st.rates[index], applied);
        }
        st.rates[index] = applied;
        Ok(applied)
    }

    fn apply_all_rates(&self, d: &Domain, st: &mut DomainInner) -> PmResult<()> {
        let mut first_err = None;
        for index in 0..d.clocks.len() {
            if let Err(err) = self.apply_rate(d, st, index) {
                log::error!("{}: {}", d.name, err);
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn set_client_rate(
        &self,
        id: DomainId,
        client: ClientId,
        index: usize,
        rate: Hertz,
    ) -> PmResult<Hertz> {
        let d = self.domain(id)?;
        Self::clock_index(d, index)?;
        let clock = d.clocks[index];

        let mut st = d.lock();
        let rounded = self
            .ops
            .round_rate(clock.id, rate)
            .map_err(|e| PmError::from(e).with_domain(&d.name))?;
        if rounded < rate {
            log::warn!("{}: clock {} cannot reach {}, using {}", d.name, clock.name, rate, rounded);
        }

        let previous = st.clients.set(client, index, rounded, &d.default_rates());
        if let Err(err) = self.apply_rate(d, &mut st, index) {
            st.clients.restore(client, index, previous);
            return Err(err);
        }
        Ok(rounded)
    }

    pub fn add_client(&self, id: DomainId, client: ClientId) -> PmResult<()> {
        let d = self.domain(id)?;
        let mut st = d.lock();
        if st.clients.insert(client, &d.default_rates()) {
            self.apply_all_rates(d, &mut st)?;
        }
        Ok(())
    }

    pub fn remove_client(&self, id: DomainId, client: ClientId) -> PmResult<()> {
        let d = self.domain(id)?;
        let mut st = d.lock();
        let Some(requests) = st.clients.remove(client) else {
            log::error!("{}: removal of unknown client {}", d.name, client.0);
            return Err(PmError::from_kind(ErrorKind::UnknownClient)
                .with_details(format!("client {}", client.0))
                .with_domain(&d.name));
        };

        if let Err(err) = self.apply_all_rates(d, &mut st) {
            st.clients.reinsert(client, requests);
            if let Err(undo) = self.apply_all_rates(d, &mut st) {
                log::error!("{}: cannot restore rates of client {}: {}", d.name, client.0, undo);
            }
            return Err(err);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn snapshot_of(&self, d: &Domain) -> DomainSnapshot {
        let st = d.lock();
        DomainSnapshot {
            name: d.name.clone(),
            parent: d.parent.map(|p| self.domains[p.0].name.clone()),
            refcount: st.refcount,
            flags: st.flags,
            state: st.state(),
            rates: st.rates.to_vec(),
            clients: st.clients.len(),
            power_on_count: st.power_on_count,
            power_off_count: st.power_off_count,
        }
    }

    pub fn snapshot(&self) -> Vec<DomainSnapshot> {
        self.domains.iter().map(|d| self.snapshot_of(d)).collect()
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Reference-counted power supervisor for a forest of domains
///
/// Built once by [`ControllerBuilder`]. Every method may be called from
/// any thread.
pub struct PowerDomainController {
    inner: Arc<Inner>,
}

impl PowerDomainController {
    /// Start building a controller around a clock driver
    pub fn builder(ops: Arc<dyn ClockOps>) -> ControllerBuilder {
        ControllerBuilder::new(ops)
    }

    /// Timing configuration in effect
    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Look a domain up by name
    pub fn domain_id(&self, name: &str) -> Option<DomainId> {
        self.inner
            .domains
            .iter()
            .position(|d| d.name == name)
            .map(DomainId)
    }

    /// Name of a domain
    pub fn domain_name(&self, id: DomainId) -> Option<&str> {
        self.inner.domains.get(id.0).map(|d| d.name.as_str())
    }

    /// Every domain, in declaration order
    pub fn domain_ids(&self) -> impl Iterator<Item = DomainId> + '_ {
        (0..self.inner.domains.len()).map(DomainId)
    }

    /// Parent of a domain
    pub fn parent(&self, id: DomainId) -> Option<DomainId> {
        self.inner.domains.get(id.0).and_then(|d| d.parent)
    }

    /// Power-owner callback installed on a domain
    pub fn hooks(&self, id: DomainId) -> Option<Arc<dyn PowerHooks>> {
        self.inner.domains.get(id.0).and_then(|d| d.hooks.clone())
    }

    // -------------------------------------------------------------------------
    // Reference counting
    // -------------------------------------------------------------------------

    /// Take a busy reference, powering the domain and its ancestors if needed
    ///
    /// On a hardware failure the domain is left as it was and the reference
    /// is not taken.
    pub fn acquire(&self, id: DomainId) -> PmResult<()> {
        self.inner.acquire(id)
    }

    /// Take a busy reference released when the guard drops
    pub fn acquire_guard(&self, id: DomainId) -> PmResult<BusyGuard<'_>> {
        self.inner.acquire(id)?;
        Ok(BusyGuard { ctl: self, id })
    }

    /// Drop one busy reference
    pub fn release(&self, id: DomainId) -> PmResult<()> {
        self.inner.release(id, 1)
    }

    /// Drop `count` busy references at once
    ///
    /// Releasing more than is held fails with
    /// [`ErrorKind::RefcountUnderflow`] and changes nothing.
    pub fn release_many(&self, id: DomainId, count: u32) -> PmResult<()> {
        self.inner.release(id, count)
    }

    // -------------------------------------------------------------------------
    // Client rates
    // -------------------------------------------------------------------------

    /// Register a client requesting the default rate of every clock
    pub fn add_client(&self, id: DomainId, client: ClientId) -> PmResult<()> {
        self.inner.add_client(id, client)
    }

    /// Record a client's minimum rate for clock `index` and reprogram the clock
    ///
    /// The request is rounded up to a rate the clock can produce; the
    /// rounded request is returned. The clock runs at the maximum request
    /// of all clients, whether or not the domain is powered.
    pub fn set_client_rate(
        &self,
        id: DomainId,
        client: ClientId,
        index: usize,
        rate: Hertz,
    ) -> PmResult<Hertz> {
        self.inner.set_client_rate(id, client, index, rate)
    }

    /// Forget a client and lower rates it was holding up
    pub fn remove_client(&self, id: DomainId, client: ClientId) -> PmResult<()> {
        self.inner.remove_client(id, client)
    }

    /// Rate currently applied to clock `index`
    pub fn get_rate(&self, id: DomainId, index: usize) -> PmResult<Hertz> {
        let d = self.inner.domain(id)?;
        Inner::clock_index(d, index)?;
        let rate = d.lock().rates[index];
        Ok(rate)
    }

    /// A client's recorded request for clock `index`
    pub fn client_rate(&self, id: DomainId, client: ClientId, index: usize) -> PmResult<Hertz> {
        let d = self.inner.domain(id)?;
        Inner::clock_index(d, index)?;
        let rate = d.lock().clients.get(client, index);
        rate.ok_or_else(|| {
            PmError::from_kind(ErrorKind::UnknownClient)
                .with_details(format!("client {}", client.0))
                .with_domain(&d.name)
        })
    }

    // -------------------------------------------------------------------------
    // Queries and waits
    // -------------------------------------------------------------------------

    /// Outstanding busy references
    pub fn refcount(&self, id: DomainId) -> PmResult<u32> {
        Ok(self.inner.domain(id)?.lock().refcount)
    }

    /// Whether clocks and power are currently on
    pub fn is_powered(&self, id: DomainId) -> PmResult<bool> {
        Ok(self.inner.domain(id)?.lock().is_powered())
    }

    /// Whether no busy reference is held
    pub fn is_idle(&self, id: DomainId) -> PmResult<bool> {
        Ok(self.inner.domain(id)?.lock().refcount == 0)
    }

    /// Whether the last suspend had to force this domain down
    pub fn is_force_suspended(&self, id: DomainId) -> PmResult<bool> {
        Ok(self
            .inner
            .domain(id)?
            .lock()
            .flags
            .contains(DomainFlags::FORCE_SUSPENDED))
    }

    /// Lifecycle state
    pub fn state(&self, id: DomainId) -> PmResult<DomainState> {
        Ok(self.inner.domain(id)?.lock().state())
    }

    /// Block until no busy reference is held and the domain is unpowered;
    /// false on timeout
    ///
    /// A domain in its grace period is not idle yet. The wait covers the
    /// deferred power-down.
    pub fn wait_idle(&self, id: DomainId, timeout: Duration) -> PmResult<bool> {
        let d = self.inner.domain(id)?;
        Ok(d.wait_until(Some(Instant::now() + timeout), |st| st.is_off()))
    }

    /// Debug view of every domain
    pub fn snapshot(&self) -> Vec<DomainSnapshot> {
        self.inner.snapshot()
    }

    /// Counters of the deferred power-down worker
    pub fn powerdown_stats(&self) -> WorkQueueStats {
        self.inner.queue.stats()
    }

    /// Add an outstanding-work tracker checked at system suspend
    pub fn register_work_tracker(&self, tracker: Arc<dyn WorkTracker>) {
        log::debug!("pmdomain: work tracker {} registered", tracker.name());
        self.inner.trackers.write().push(tracker);
    }

    // -------------------------------------------------------------------------
    // Suspend and teardown
    // -------------------------------------------------------------------------

    /// Bring a domain and its descendants to idle, or every domain when
    /// `system_wide` is set
    ///
    /// See [`crate::suspend`] for the forced recovery taken on timeout.
    pub fn suspend(&self, id: DomainId, system_wide: bool) -> PmResult<SuspendReport> {
        self.inner.domain(id)?;
        self.inner.suspend(Some(id), system_wide)
    }

    /// System-wide suspend of the whole forest
    pub fn suspend_all(&self) -> PmResult<SuspendReport> {
        self.inner.suspend(None, true)
    }

    /// Force every domain idle, stop the worker and hand clock handles back
    ///
    /// Later `acquire` calls fail with [`ErrorKind::ShutDown`]. Calling it
    /// again is a no-op.
    pub fn shutdown(&self) -> PmResult<SuspendReport> {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(SuspendReport::default());
        }
        log::info!("pmdomain: shutting down");

        let result = self.inner.suspend(None, true);
        self.inner.queue.shutdown();

        for d in &self.inner.domains {
            for clock in &d.clocks {
                self.inner.ops.put(clock.id);
            }
        }
        result
    }
}

impl Drop for PowerDomainController {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("pmdomain: teardown did not reach idle: {}", err);
        }
    }
}

impl core::fmt::Debug for PowerDomainController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PowerDomainController")
            .field("domains", &self.inner.domains)
            .field("config", &self.inner.config)
            .finish()
    }
}

// =============================================================================
// BUSY GUARD
// =============================================================================

/// A busy reference on a domain, released on drop
#[derive(Debug)]
pub struct BusyGuard<'a> {
    ctl: &'a PowerDomainController,
    id: DomainId,
}

impl BusyGuard<'_> {
    /// Domain the reference is held on
    pub fn domain(&self) -> DomainId {
        self.id
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.ctl.release(self.id) {
            log::error!("pmdomain: busy guard release failed: {}", err);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
