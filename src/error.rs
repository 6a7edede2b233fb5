//! Error types for numlink

use thiserror::Error;

/// Result type alias using numlink's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Host status code reported for a successful call.
pub const STATUS_OK: i32 = 0;

/// Errors that can occur while bridging host array handles
///
/// Every error is raised synchronously at the point of violation and
/// propagates with `?` up to the call adapter, which records it and turns it
/// into a numeric status for the host.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A value cannot be represented in the requested storage kind
    /// (e.g. complex into a real/integer element type)
    #[error("type error: {0}")]
    Type(String),

    /// A handle's rank does not match the statically requested rank
    #[error("rank error: expected rank {expected}, handle has rank {got}")]
    Rank {
        /// Rank requested by the array type
        expected: usize,
        /// Rank reported by the host handle
        got: usize,
    },

    /// Shape or structure mismatch between two operands
    #[error("dimension error: {0}")]
    Dimension(String),

    /// An index is outside the extent of its dimension (after negative wrap)
    #[error("index {index} out of range for dimension {axis} of extent {extent}")]
    OutOfRange {
        /// Dimension level the index applies to
        axis: usize,
        /// The offending index as written by the caller
        index: isize,
        /// Extent of that dimension
        extent: usize,
    },

    /// Numerical failure reported by a computation built on this layer
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Local buffer allocation failed
    #[error("memory error: failed to allocate {elems} elements")]
    Memory {
        /// Number of elements requested
        elems: usize,
    },

    /// An operation would change which positions are explicit on shared
    /// sparse storage
    #[error("structural mismatch on shared storage: {0}")]
    StructuralMismatch(String),

    /// Malformed call: wrong argument count or argument cell kind
    #[error("function error: {0}")]
    Function(String),

    /// Failure status returned by the host runtime itself
    #[error("host error {code}: {message}")]
    Host {
        /// The host's own status code
        code: i32,
        /// Description of the failing primitive
        message: String,
    },
}

impl Error {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    /// Create a dimension error
    pub fn dimension(msg: impl Into<String>) -> Self {
        Self::Dimension(msg.into())
    }

    /// Create a structural mismatch error
    pub fn structural(msg: impl Into<String>) -> Self {
        Self::StructuralMismatch(msg.into())
    }

    /// Create a function error for a malformed call
    pub fn function(msg: impl Into<String>) -> Self {
        Self::Function(msg.into())
    }

    /// Create a host error from a failing primitive
    pub fn host(code: i32, message: impl Into<String>) -> Self {
        Self::Host {
            code,
            message: message.into(),
        }
    }

    /// Numeric status reported to the host for this error.
    ///
    /// Codes follow the host's convention: 1 type, 2 rank, 3 dimension,
    /// 4 numerical, 5 memory, 6 function. Out-of-range indexing maps to -1,
    /// the host's catch-all user error. Host errors keep their own code.
    pub fn status(&self) -> i32 {
        match self {
            Self::Type(_) => 1,
            Self::Rank { .. } => 2,
            Self::Dimension(_) | Self::StructuralMismatch(_) => 3,
            Self::Numerical(_) => 4,
            Self::Memory { .. } => 5,
            Self::Function(_) => 6,
            Self::OutOfRange { .. } => -1,
            Self::Host { code, .. } => *code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_host_convention() {
        assert_eq!(Error::type_error("x").status(), 1);
        assert_eq!(
            Error::Rank {
                expected: 2,
                got: 3
            }
            .status(),
            2
        );
        assert_eq!(Error::dimension("x").status(), 3);
        assert_eq!(Error::structural("x").status(), 3);
        assert_eq!(Error::Memory { elems: 8 }.status(), 5);
        assert_eq!(
            Error::OutOfRange {
                axis: 0,
                index: -4,
                extent: 3
            }
            .status(),
            -1
        );
        assert_eq!(Error::host(42, "boom").status(), 42);
    }
}
