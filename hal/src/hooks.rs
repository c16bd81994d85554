//! Domain owner callbacks.

use crate::error::HalResult;

/// Physical power transition reported to a domain owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerAction {
    /// Clocks and power island are up; registers may be reprogrammed
    PoweredOn,
    /// About to gate clocks and power; save anything that must survive
    PoweredOff,
}

/// Domain-specific hook invoked around physical power transitions
///
/// `PoweredOn` runs after power is established, `PoweredOff` runs before
/// clocks are gated. The controller calls the hook with the domain lock held,
/// so a hook must not acquire or release the same domain.
pub trait PowerHooks: Send + Sync {
    /// Called on every physical transition of the domain
    fn on_power_change(&self, domain: &str, action: PowerAction) -> HalResult<()>;
}
