//! Error types for process memory access

use std::fmt;
use thiserror::Error;

/// Main error type for session, memory and image operations
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Session for process {pid} has been released")]
    SessionReleased { pid: u32 },

    #[error("Pooled buffer used after release")]
    BufferReleased,

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Access denied to process {pid}: {reason}")]
    AccessDenied { pid: u32, reason: String },

    #[error("Failed to read memory at {address}: {reason}")]
    ReadFailed { address: String, reason: String },

    #[error("Failed to write memory at {address}: {reason}")]
    WriteFailed { address: String, reason: String },

    #[error("Partial transfer at {address}: requested {requested} bytes, transferred {transferred}")]
    PartialTransfer {
        address: String,
        requested: usize,
        transferred: usize,
    },

    #[error("Pointer chain broken at level {level}: {reason}")]
    PointerChainBroken { level: usize, reason: String },

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("Buffer negotiation did not converge after {attempts} attempts")]
    RetryExhausted { attempts: usize },

    #[error("Malformed image at {base}: {reason}")]
    MalformedImage { base: String, reason: String },

    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    #[cfg(windows)]
    #[error("Windows API error: {0}")]
    WindowsApiError(#[from] windows::core::Error),

    #[error("Windows API: {0}")]
    WindowsApi(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Coarse classification of a [`MemoryError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Programmer error: bad argument or use of a released resource. Not retried.
    Usage,
    /// A single read, write or enumerate call failed against the live target.
    TransientAccess,
    /// Image headers or the export directory are unreadable or malformed.
    StructuralParse,
    /// Buffer negotiation did not converge within its attempt bound.
    RetryExhausted,
}

impl MemoryError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MemoryError::InvalidArgument(_)
            | MemoryError::SessionReleased { .. }
            | MemoryError::BufferReleased => ErrorKind::Usage,
            MemoryError::MalformedImage { .. } => ErrorKind::StructuralParse,
            MemoryError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            _ => ErrorKind::TransientAccess,
        }
    }

    /// Whether this is a usage (programmer) error
    pub fn is_usage(&self) -> bool {
        self.kind() == ErrorKind::Usage
    }

    /// Whether the caller may reasonably retry the failed call
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientAccess | ErrorKind::RetryExhausted
        )
    }

    /// Creates a new Windows API error with the last error code
    #[cfg(windows)]
    pub fn last_os_error() -> Self {
        MemoryError::WindowsApiError(windows::core::Error::from_win32())
    }

    /// Creates an invalid argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        MemoryError::InvalidArgument(reason.into())
    }

    /// Creates an access denied error for a process
    pub fn access_denied(pid: u32, reason: impl Into<String>) -> Self {
        MemoryError::AccessDenied {
            pid,
            reason: reason.into(),
        }
    }

    /// Creates a read failed error
    pub fn read_failed(address: impl fmt::Display, reason: impl Into<String>) -> Self {
        MemoryError::ReadFailed {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a write failed error
    pub fn write_failed(address: impl fmt::Display, reason: impl Into<String>) -> Self {
        MemoryError::WriteFailed {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a partial transfer error
    pub fn partial_transfer(
        address: impl fmt::Display,
        requested: usize,
        transferred: usize,
    ) -> Self {
        MemoryError::PartialTransfer {
            address: address.to_string(),
            requested,
            transferred,
        }
    }

    /// Creates a pointer chain broken error
    pub fn pointer_chain_broken(level: usize, reason: impl Into<String>) -> Self {
        MemoryError::PointerChainBroken {
            level,
            reason: reason.into(),
        }
    }

    /// Creates a malformed image error
    pub fn malformed_image(base: impl fmt::Display, reason: impl Into<String>) -> Self {
        MemoryError::MalformedImage {
            base: base.to_string(),
            reason: reason.into(),
        }
    }
}
