//! # Configuration
//!
//! Controller-wide timing knobs and the per-domain descriptions the
//! controller is built from.
//!
//! ## Example
//!
//! ```rust,ignore
//! let config = ControllerConfig::default()
//!     .powerdown_delay(Duration::from_millis(25))
//!     .suspend_timeout(Duration::from_secs(2));
//!
//! let host1x = DomainDesc::new("host1x")
//!     .clock(ClockDesc::new(ClockId(0), "host1x", Hertz::from_mhz(166)));
//!
//! let gr3d = DomainDesc::new("gr3d")
//!     .parent("host1x")
//!     .clock(ClockDesc::new(ClockId(1), "gr3d", Hertz::from_mhz(300)))
//!     .powergate(PowergateId(1));
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use pmdomain_hal::{ClockId, Hertz, PowerHooks, PowergateId};

/// Maximum number of clocks a single domain can drive
pub const MAX_CLOCKS: usize = 4;

// =============================================================================
// CONTROLLER CONFIG
// =============================================================================

/// Controller-wide timing configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Coalescing window between the last release and the actual power-down
    pub powerdown_delay: Duration,
    /// How long suspend waits for domains to go idle before forcing them
    pub suspend_timeout: Duration,
    /// Settle time after a power island comes up
    pub powergate_settle: Duration,
    /// Thread name of the deferred power-down worker
    pub worker_name: String,
}

impl ControllerConfig {
    /// Set the coalescing window
    pub fn powerdown_delay(mut self, delay: Duration) -> Self {
        self.powerdown_delay = delay;
        self
    }

    /// Set the suspend idle-wait bound
    pub fn suspend_timeout(mut self, timeout: Duration) -> Self {
        self.suspend_timeout = timeout;
        self
    }

    /// Set the power-island settle delay
    pub fn powergate_settle(mut self, settle: Duration) -> Self {
        self.powergate_settle = settle;
        self
    }

    /// Set the worker thread name
    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            powerdown_delay: Duration::from_millis(25),
            suspend_timeout: Duration::from_secs(2),
            powergate_settle: Duration::from_micros(10),
            worker_name: String::from("pmdomain-powerdown"),
        }
    }
}

// =============================================================================
// DOMAIN DESCRIPTION
// =============================================================================

/// A clock driven by a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockDesc {
    /// Driver handle
    pub id: ClockId,
    /// Name used in log messages
    pub name: &'static str,
    /// Rate applied at init and when no client has a request
    pub default_rate: Hertz,
}

impl ClockDesc {
    /// Describe a clock
    pub const fn new(id: ClockId, name: &'static str, default_rate: Hertz) -> Self {
        Self {
            id,
            name,
            default_rate,
        }
    }
}

/// How a domain is switched on and off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerKind {
    /// Every clock enabled independently, in registration order
    #[default]
    Clocks,
    /// A power island sequenced together with the domain's single clock
    Powergate(PowergateId),
}

/// Description of one power domain
#[derive(Clone)]
pub struct DomainDesc {
    pub(crate) name: String,
    pub(crate) parent: Option<String>,
    pub(crate) clocks: Vec<ClockDesc>,
    pub(crate) kind: PowerKind,
    pub(crate) powerdown_delay: Option<Duration>,
    pub(crate) hooks: Option<Arc<dyn PowerHooks>>,
}

impl DomainDesc {
    /// Start a description with a stable name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            clocks: Vec::new(),
            kind: PowerKind::Clocks,
            powerdown_delay: None,
            hooks: None,
        }
    }

    /// Add a clock; clocks are enabled in the order they are added
    pub fn clock(mut self, clock: ClockDesc) -> Self {
        self.clocks.push(clock);
        self
    }

    /// Gate the domain through a power island
    pub fn powergate(mut self, id: PowergateId) -> Self {
        self.kind = PowerKind::Powergate(id);
        self
    }

    /// Name the parent domain that must be powered first
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Override the controller-wide coalescing window
    pub fn powerdown_delay(mut self, delay: Duration) -> Self {
        self.powerdown_delay = Some(delay);
        self
    }

    /// Install the owner's power callback
    pub fn hooks(mut self, hooks: Arc<dyn PowerHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Domain name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent name, if any
    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Registered clocks
    pub fn clocks(&self) -> &[ClockDesc] {
        &self.clocks
    }

    /// Power switching kind
    pub fn kind(&self) -> PowerKind {
        self.kind
    }
}

impl fmt::Debug for DomainDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainDesc")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("clocks", &self.clocks)
            .field("kind", &self.kind)
            .field("powerdown_delay", &self.powerdown_delay)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ControllerConfig::default();
        assert_eq!(cfg.powerdown_delay, Duration::from_millis(25));
        assert_eq!(cfg.suspend_timeout, Duration::from_secs(2));
        assert_eq!(cfg.powergate_settle, Duration::from_micros(10));
    }

    #[test]
    fn test_config_setters() {
        let cfg = ControllerConfig::default()
            .powerdown_delay(Duration::from_millis(5))
            .worker_name("pd-test");
        assert_eq!(cfg.powerdown_delay, Duration::from_millis(5));
        assert_eq!(cfg.worker_name, "pd-test");
    }

    #[test]
    fn test_domain_desc() {
        let desc = DomainDesc::new("gr3d")
            .parent("host1x")
            .clock(ClockDesc::new(ClockId(3), "gr3d", Hertz::from_mhz(300)))
            .powergate(PowergateId(1));

        assert_eq!(desc.name(), "gr3d");
        assert_eq!(desc.parent_name(), Some("host1x"));
        assert_eq!(desc.clocks().len(), 1);
        assert_eq!(desc.kind(), PowerKind::Powergate(PowergateId(1)));
    }
}
