//! # pmdomain Hardware Abstraction Layer
//!
//! The narrow interfaces the power-domain controller uses to talk to the
//! hardware and to the subsystems around it. Nothing in this crate touches a
//! register: board code implements these traits over its clock framework,
//! its power-gate controller and its work-tracking counters.
//!
//! ## Collaborators
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    PowerDomainController                         │
//! │                                                                  │
//! │   consumes                 exposes                 consumes      │
//! │      │                        │                       │          │
//! │      ▼                        ▼                       ▼          │
//! │ ┌──────────┐           ┌────────────┐          ┌─────────────┐   │
//! │ │ ClockOps │           │ PowerHooks │          │ WorkTracker │   │
//! │ │          │           │            │          │             │   │
//! │ │ enable   │           │ on_power_  │          │ read_current│   │
//! │ │ disable  │           │  change    │          │ read_expect │   │
//! │ │ set_rate │           └────────────┘          │ force_adv.  │   │
//! │ │ round_   │                                   └─────────────┘   │
//! │ │  rate    │                                                     │
//! │ │ island   │                                                     │
//! │ │  up/down │                                                     │
//! │ │ reset    │                                                     │
//! │ └──────────┘                                                     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All calls are synchronous and bounded-latency. A failure means the caller
//! cannot proceed with the power transition it was attempting.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod clock;
pub mod error;
pub mod hooks;
pub mod tracker;

pub use clock::{ClockId, ClockOps, Hertz, PowergateId};
pub use error::{HalError, HalResult};
pub use hooks::{PowerAction, PowerHooks};
pub use tracker::{CounterId, WorkTracker};
