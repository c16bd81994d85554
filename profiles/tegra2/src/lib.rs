//! # Tegra2 Host1x Profile
//!
//! Power-domain layout of the host1x client units on Tegra2-class SoCs.
//!
//! ```text
//!                     ┌──────────┐
//!                     │  host1x  │  108 MHz, clocks only
//!                     └────┬─────┘
//!          ┌───────────────┼───────────────┐
//!          ▼               ▼               ▼
//!     ┌─────────┐     ┌─────────┐     ┌─────────┐
//!     │  gr3d   │     │  gr2d   │     │   mpe   │
//!     │ island  │     │ gr2d+epp│     │ island  │
//!     └─────────┘     └─────────┘     └─────────┘
//! ```
//!
//! gr3d and mpe sit behind their own power islands; gr2d shares the always-on
//! rail and only gates its two clocks.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod syncpt;

use std::sync::Arc;

use pmdomain_core::{
    ClockDesc, ControllerConfig, DomainDesc, PmResult, PowerDomainController,
};
use pmdomain_hal::{ClockId, ClockOps, Hertz, PowergateId};

pub use syncpt::Host1xSyncpoints;

// =============================================================================
// Clocks and Islands
// =============================================================================

/// Clock handles as numbered by the board clock driver
pub mod clk {
    use super::ClockId;

    /// host1x bus clock
    pub const HOST1X: ClockId = ClockId(28);
    /// 3D engine
    pub const GR3D: ClockId = ClockId(24);
    /// 2D engine
    pub const GR2D: ClockId = ClockId(21);
    /// Encoder pre-processor, clocked with 2D
    pub const EPP: ClockId = ClockId(19);
    /// Video encoder
    pub const MPE: ClockId = ClockId(60);
}

/// Power-management controller partition numbers
pub mod pg {
    use super::PowergateId;

    /// 3D partition
    pub const GR3D: PowergateId = PowergateId(1);
    /// MPE partition
    pub const MPE: PowergateId = PowergateId(6);
}

/// Domain names, stable across boards
pub mod name {
    /// Parent of every host1x client
    pub const HOST1X: &str = "host1x";
    /// 3D engine
    pub const GR3D: &str = "gr3d";
    /// 2D engine and EPP
    pub const GR2D: &str = "gr2d";
    /// Video encoder
    pub const MPE: &str = "mpe";
}

const HOST1X_RATE: Hertz = Hertz::from_mhz(108);
const ENGINE_RATE: Hertz = Hertz::from_mhz(300);

// =============================================================================
// Layout
// =============================================================================

/// Domain forest of the host1x client units
pub fn domains() -> Vec<DomainDesc> {
    let mut domains = vec![
        DomainDesc::new(name::HOST1X).clock(ClockDesc::new(clk::HOST1X, "host1x", HOST1X_RATE)),
        DomainDesc::new(name::GR3D)
            .parent(name::HOST1X)
            .clock(ClockDesc::new(clk::GR3D, "gr3d", ENGINE_RATE))
            .powergate(pg::GR3D),
        DomainDesc::new(name::GR2D)
            .parent(name::HOST1X)
            .clock(ClockDesc::new(clk::GR2D, "gr2d", ENGINE_RATE))
            .clock(ClockDesc::new(clk::EPP, "epp", ENGINE_RATE)),
    ];

    if cfg!(not(feature = "no-mpe")) {
        domains.push(
            DomainDesc::new(name::MPE)
                .parent(name::HOST1X)
                .clock(ClockDesc::new(clk::MPE, "mpe", ENGINE_RATE))
                .powergate(pg::MPE),
        );
    }
    domains
}

/// Build the host1x controller, with `syncpts` checked at system suspend
pub fn bring_up(
    ops: Arc<dyn ClockOps>,
    config: ControllerConfig,
    syncpts: Arc<Host1xSyncpoints>,
) -> PmResult<PowerDomainController> {
    let layout = domains();
    log::info!("tegra2: bringing up {} host1x domain(s)", layout.len());

    PowerDomainController::builder(ops)
        .config(config)
        .domains(layout)
        .work_tracker(syncpts)
        .build()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pmdomain_core::mock::{HwEvent, MockClocks};
    use pmdomain_core::{ClientId, DomainState};
    use pmdomain_hal::CounterId;

    use super::*;

    fn config() -> ControllerConfig {
        ControllerConfig::default()
            .powerdown_delay(Duration::from_secs(10))
            .suspend_timeout(Duration::from_millis(50))
            .powergate_settle(Duration::ZERO)
    }

    #[test]
    fn test_layout() {
        let layout = domains();
        assert_eq!(layout[0].name(), name::HOST1X);
        assert!(layout[1..].iter().all(|d| d.parent_name() == Some(name::HOST1X)));
        assert_eq!(layout[2].clocks().len(), 2);
    }

    #[test]
    fn test_bring_up_gates_islands() {
        let clocks = Arc::new(MockClocks::new());
        let ctl = bring_up(clocks.clone(), config(), Arc::new(Host1xSyncpoints::new())).unwrap();

        assert!(clocks.events().contains(&HwEvent::IslandDown(pg::GR3D)));
        assert_eq!(clocks.rate(clk::HOST1X), Some(HOST1X_RATE));
        for id in ctl.domain_ids() {
            assert_eq!(ctl.state(id).unwrap(), DomainState::Idle);
        }
    }

    #[test]
    fn test_job_then_system_suspend() {
        let clocks = Arc::new(MockClocks::new());
        let syncpts = Arc::new(Host1xSyncpoints::new());
        let ctl = bring_up(clocks.clone(), config(), syncpts.clone()).unwrap();
        let gr3d = ctl.domain_id(name::GR3D).unwrap();
        let host1x = ctl.domain_id(name::HOST1X).unwrap();

        ctl.set_client_rate(gr3d, ClientId(1), 0, Hertz::from_mhz(400)).unwrap();
        ctl.acquire(gr3d).unwrap();
        assert!(ctl.is_powered(host1x).unwrap());

        // a job that never signals its sync point
        let thresh = syncpts.incr_max(0, 2);
        syncpts.update_min(0, 1);

        let report = ctl.suspend_all().unwrap();
        assert_eq!(report.forced, vec![name::GR3D.to_string()]);
        assert_eq!(report.tracker_fixups.len(), 1);
        assert_eq!(report.tracker_fixups[0].counter, CounterId(0));
        assert!(syncpts.is_expired(0, thresh));

        assert!(!ctl.is_powered(host1x).unwrap());
        assert!(!clocks.is_island_up(pg::GR3D));
        assert_eq!(clocks.rate(clk::GR3D), Some(Hertz::from_mhz(400)));
    }
}
