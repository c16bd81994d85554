//! # Error Handling
//!
//! Error types for the power-domain controller.
//!
//! ## Error Categories
//!
//! | Category | Kinds | Policy |
//! |----------|-------|--------|
//! | General | NotFound, InvalidArgument, ShutDown, Internal | Return to caller |
//! | Configuration | InvalidConfig, DuplicateDomain, UnknownParent, ... | Fail `build()` |
//! | Refcount | RefcountUnderflow | Caller bug, critical |
//! | Client | UnknownClient | Caller bug |
//! | Hardware | Hardware | Domain left unpowered, caller decides |
//! | Suspend | ForcedIdleFailed | Critical |

use std::fmt;

use pmdomain_hal::HalError;

// =============================================================================
// ERROR KIND
// =============================================================================

/// Classification of controller errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorKind {
    // -------------------------------------------------------------------------
    // General Errors (0-99)
    // -------------------------------------------------------------------------
    /// Domain or clock index does not exist
    NotFound             = 1,

    /// Invalid argument provided
    InvalidArgument      = 2,

    /// Controller has been shut down
    ShutDown             = 3,

    /// Internal failure (worker thread could not start)
    Internal             = 4,

    // -------------------------------------------------------------------------
    // Configuration Errors (100-199)
    // -------------------------------------------------------------------------
    /// Invalid domain description
    InvalidConfig        = 100,

    /// Two domains share a name
    DuplicateDomain      = 101,

    /// Parent names a domain that was never declared
    UnknownParent        = 102,

    /// Parent links form a cycle
    ParentCycle          = 103,

    // -------------------------------------------------------------------------
    // Refcount Errors (200-299)
    // -------------------------------------------------------------------------
    /// Release of more references than are held
    RefcountUnderflow    = 200,

    // -------------------------------------------------------------------------
    // Client Errors (300-399)
    // -------------------------------------------------------------------------
    /// Client is not registered with the domain
    UnknownClient        = 300,

    // -------------------------------------------------------------------------
    // Hardware Errors (400-499)
    // -------------------------------------------------------------------------
    /// Clock, power island or callback failure
    Hardware             = 400,

    // -------------------------------------------------------------------------
    // Suspend Errors (500-599)
    // -------------------------------------------------------------------------
    /// Domain still powered after forced recovery
    ForcedIdleFailed     = 500,
}

impl ErrorKind {
    /// Get the error category name
    pub const fn category(&self) -> &'static str {
        match *self as u32 {
            0..=99 => "General",
            100..=199 => "Configuration",
            200..=299 => "Refcount",
            300..=399 => "Client",
            400..=499 => "Hardware",
            500..=599 => "Suspend",
            _ => "Unknown",
        }
    }

    /// Check if the caller may retry or otherwise carry on
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, ErrorKind::Hardware)
    }

    /// Check if the error leaves the system in a state the controller cannot repair
    pub const fn is_critical(&self) -> bool {
        matches!(self, ErrorKind::RefcountUnderflow | ErrorKind::ForcedIdleFailed)
    }

    const fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "Not found",
            ErrorKind::InvalidArgument => "Invalid argument",
            ErrorKind::ShutDown => "Controller shut down",
            ErrorKind::Internal => "Internal error",
            ErrorKind::InvalidConfig => "Invalid configuration",
            ErrorKind::DuplicateDomain => "Duplicate domain name",
            ErrorKind::UnknownParent => "Unknown parent domain",
            ErrorKind::ParentCycle => "Parent links form a cycle",
            ErrorKind::RefcountUnderflow => "Refcount underflow",
            ErrorKind::UnknownClient => "Unknown client",
            ErrorKind::Hardware => "Hardware failure",
            ErrorKind::ForcedIdleFailed => "Domain powered after forced idle",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// =============================================================================
// PM ERROR
// =============================================================================

/// Result type for controller operations
pub type PmResult<T> = Result<T, PmError>;

/// Controller error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmError {
    kind: ErrorKind,
    message: &'static str,
    details: Option<String>,
    domain: Option<String>,
    hal: Option<HalError>,
}

impl PmError {
    /// Create new error with kind and message
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self {
            kind,
            message,
            details: None,
            domain: None,
            hal: None,
        }
    }

    /// Create error from kind with default message
    pub const fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    /// Add details to error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Name the domain the error happened on
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_owned());
        self
    }

    /// Get error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get message
    pub fn message(&self) -> &str {
        self.message
    }

    /// Get details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Get the domain name, if any
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Underlying hardware failure, if any
    pub fn hal_error(&self) -> Option<HalError> {
        self.hal
    }

    /// Check if critical
    pub fn is_critical(&self) -> bool {
        self.kind.is_critical()
    }
}

impl From<ErrorKind> for PmError {
    fn from(kind: ErrorKind) -> Self {
        Self::from_kind(kind)
    }
}

impl From<HalError> for PmError {
    fn from(err: HalError) -> Self {
        Self {
            kind: ErrorKind::Hardware,
            message: err.as_str(),
            details: None,
            domain: None,
            hal: Some(err),
        }
    }
}

impl fmt::Display for PmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.category(), self.message)?;

        if let Some(ref details) = self.details {
            write!(f, ": {}", details)?;
        }

        if let Some(ref domain) = self.domain {
            write!(f, " (domain: {})", domain)?;
        }

        Ok(())
    }
}

impl std::error::Error for PmError {}

// =============================================================================
// TESTS
// =============================================================================
