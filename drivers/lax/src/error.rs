//! LAX Error Handling
//!
//! Typed errors for every driver request, with the condition value the host
//! returns to the caller.

use core::fmt;

use crate::io::AccessFault;
use crate::unit::UnitHandle;

/// Condition values reported to callers
pub mod status {
    /// Successful completion
    pub const NORMAL: u32 = 1;
    /// Access violation
    pub const ACCVIO: u32 = 12;
    /// Bad parameter value
    pub const BADPARAM: u32 = 20;
    /// Insufficient privilege
    pub const NOPRIV: u32 = 36;
    /// Insufficient dynamic memory
    pub const INSFMEM: u32 = 292;
    /// No such device
    pub const NOSUCHDEV: u32 = 2312;
}

/// Driver error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaxError {
    // ═══════════════════════════════════════════════════════════════
    // Request Errors
    // ═══════════════════════════════════════════════════════════════

    /// Transfer length below the minimum for the function
    InvalidArgument { requested: usize, minimum: usize },

    /// Control write without CMKRNL
    PermissionDenied,

    /// Caller buffer failed its access check
    Validation(AccessFault),

    // ═══════════════════════════════════════════════════════════════
    // Unit Errors
    // ═══════════════════════════════════════════════════════════════

    /// Handle does not name a live unit
    NoSuchUnit(UnitHandle),

    /// Every unit slot is in use
    UnitLimit { max: usize },

    // ═══════════════════════════════════════════════════════════════
    // Configuration Errors
    // ═══════════════════════════════════════════════════════════════

    /// Rejected driver configuration
    InvalidConfig(&'static str),
}

impl fmt::Display for LaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { requested, minimum } => {
                write!(f, "Invalid length {} (minimum {})", requested, minimum)
            }
            Self::PermissionDenied => write!(f, "CMKRNL privilege required"),
            Self::Validation(fault) => {
                write!(f, "Buffer access check failed (status {})", fault.status)
            }
            Self::NoSuchUnit(handle) => write!(f, "No such unit: {}", handle.index()),
            Self::UnitLimit { max } => write!(f, "Unit limit reached: {}", max),
            Self::InvalidConfig(reason) => write!(f, "Invalid configuration: {}", reason),
        }
    }
}

impl LaxError {
    /// Condition value for the I/O status block
    pub fn status(&self) -> u32 {
        match self {
            Self::InvalidArgument { .. } => status::BADPARAM,
            Self::PermissionDenied => status::NOPRIV,
            Self::Validation(fault) => fault.status,
            Self::NoSuchUnit(_) => status::NOSUCHDEV,
            Self::UnitLimit { .. } => status::INSFMEM,
            Self::InvalidConfig(_) => status::BADPARAM,
        }
    }

    /// Is the request itself at fault (as opposed to driver setup)?
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. } | Self::PermissionDenied | Self::Validation(_)
        )
    }
}

/// Result type for driver operations
pub type LaxResult<T> = Result<T, LaxError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_status_mapping() {
        let bad = LaxError::InvalidArgument {
            requested: 2,
            minimum: 4,
        };
        assert_eq!(bad.status(), status::BADPARAM);
        assert_eq!(LaxError::PermissionDenied.status(), status::NOPRIV);
        assert_eq!(
            LaxError::Validation(AccessFault::new(0x8000)).status(),
            0x8000
        );
        assert_eq!(
            LaxError::NoSuchUnit(UnitHandle::new(3)).status(),
            status::NOSUCHDEV
        );
    }

    #[test]
    fn test_no_error_reports_success() {
        let all = [
            LaxError::InvalidArgument {
                requested: 0,
                minimum: 1,
            },
            LaxError::PermissionDenied,
            LaxError::Validation(AccessFault::ACCVIO),
            LaxError::NoSuchUnit(UnitHandle::new(0)),
            LaxError::UnitLimit { max: 1 },
            LaxError::InvalidConfig("x"),
        ];
        for err in all {
            assert_ne!(err.status(), status::NORMAL, "{}", err);
        }
    }

    #[test]
    fn test_caller_errors() {
        assert!(LaxError::PermissionDenied.is_caller_error());
        assert!(LaxError::Validation(AccessFault::ACCVIO).is_caller_error());
        assert!(!LaxError::UnitLimit { max: 1 }.is_caller_error());
        assert!(!LaxError::InvalidConfig("x").is_caller_error());
    }

    #[test]
    fn test_display() {
        let err = LaxError::InvalidArgument {
            requested: 2,
            minimum: 4,
        };
        assert_eq!(err.to_string(), "Invalid length 2 (minimum 4)");
        assert_eq!(
            LaxError::NoSuchUnit(UnitHandle::new(5)).to_string(),
            "No such unit: 5"
        );
    }
}
