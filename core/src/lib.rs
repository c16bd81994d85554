//! # pmdomain Core
//!
//! A reference-counted supervisor for a forest of power-gateable hardware
//! domains. A domain is powered exactly while someone holds a busy
//! reference on it, rapid release/acquire cycles are absorbed by a deferred
//! power-down, and suspend forces a consistent idle state even when clients
//! leak references.
//!
//! ## Components
//!
//! - **Controller**: builds the forest, owns acquire/release and rates
//! - **Domain**: per-domain lock, state machine and power sequences
//! - **Client table**: per-client minimum rates, max-aggregated per clock
//! - **Work queue**: the worker thread that runs deferred power-downs
//! - **Suspend**: bounded idle wait and forced recovery
//!
//! ## Example
//!
//! ```rust,ignore
//! let ctl = PowerDomainController::builder(clock_driver)
//!     .domain(DomainDesc::new("host1x").clock(host1x_clk))
//!     .domain(DomainDesc::new("gr3d").parent("host1x").clock(gr3d_clk).powergate(GR3D))
//!     .build()?;
//!
//! let gr3d = ctl.domain_id("gr3d").unwrap();
//! {
//!     let _busy = ctl.acquire_guard(gr3d)?;
//!     // submit work
//! }
//! ctl.suspend_all()?;
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod suspend;
pub mod workqueue;

pub use client::ClientId;
pub use config::{ClockDesc, ControllerConfig, DomainDesc, PowerKind, MAX_CLOCKS};
pub use controller::{BusyGuard, ControllerBuilder, PowerDomainController};
pub use domain::{DomainFlags, DomainId, DomainSnapshot, DomainState};
pub use error::{ErrorKind, PmError, PmResult};
pub use suspend::{SuspendReport, TrackerFixup};
pub use workqueue::WorkQueueStats;

pub use pmdomain_hal as hal;

static_assertions::assert_impl_all!(PowerDomainController: Send, Sync);
static_assertions::assert_impl_all!(PmError: Send, Sync, std::error::Error);
static_assertions::const_assert!(MAX_CLOCKS <= 8);
