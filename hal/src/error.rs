//! Collaborator error type.

use core::fmt;

/// Result type for hardware operations
pub type HalResult<T> = Result<T, HalError>;

/// Failure reported by a clock driver, power-gate controller or hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HalError {
    /// Clock could not be enabled
    ClockEnable,
    /// Clock rate could not be rounded or applied
    ClockRate,
    /// Power island failed to switch
    Powergate,
    /// Reset line could not be asserted
    Reset,
    /// Domain-specific power callback failed
    Callback,
    /// Operation not supported by this driver
    Unsupported,
}

impl HalError {
    /// Short human-readable description
    pub const fn as_str(&self) -> &'static str {
        match self {
            HalError::ClockEnable => "clock enable failed",
            HalError::ClockRate => "clock rate change failed",
            HalError::Powergate => "power island switch failed",
            HalError::Reset => "reset assertion failed",
            HalError::Callback => "power callback failed",
            HalError::Unsupported => "operation not supported",
        }
    }
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
