//! Error types for backends, sessions and benchmark runs.

use thiserror::Error;

use crate::report::BenchmarkRun;
use crate::session::SessionState;

/// Errors a device execution backend reports.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// Kernel source or build options rejected by the device compiler.
    #[error("failed to compile kernel '{kernel}': {log}")]
    Compile {
        /// Entry point that was being compiled
        kernel: String,
        /// Compiler output
        log: String,
    },

    /// A launch, transfer or device-level fault during execution.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Device memory for an argument could not be allocated.
    #[error("failed to allocate {bytes} bytes: {reason}")]
    Allocation {
        /// Requested size
        bytes: usize,
        /// Backend-specific reason
        reason: String,
    },

    /// Session could not be brought up on the requested platform/device.
    #[error("cannot initialize platform {platform} device {device}: {reason}")]
    Init {
        /// Platform index
        platform: usize,
        /// Device index
        device: usize,
        /// Backend-specific reason
        reason: String,
    },

    /// Session teardown failed.
    #[error("shutdown failed: {0}")]
    Shutdown(String),

    /// Operation not supported by this backend.
    #[error("unsupported by {backend} backend: {what}")]
    Unsupported {
        /// Backend name
        backend: &'static str,
        /// Operation or argument kind
        what: String,
    },
}

impl BackendError {
    /// Whether this failure puts the session into recovery.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, Self::Execution(_) | Self::Allocation { .. })
    }
}

/// A malformed benchmark request. Raised before any backend interaction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no data sizes specified")]
    NoDataSizes,

    #[error("illegal data size at index {index}: {value} (must be positive)")]
    NonPositiveDataSize { index: usize, value: u64 },

    #[error("illegal number of executions: {0}")]
    NonPositiveIterations(u32),

    #[error(
        "illegal timeout: {0} (must be a finite, non-negative number of seconds)"
    )]
    InvalidTimeout(f64),
}

/// Context for an execution failure of one data size inside a sweep.
///
/// The session has already been recovered when this is returned; runs of the
/// sizes before the failing one are intact, and `remaining` lists the sizes a
/// retry should cover (the failing size first).
#[derive(Debug, Clone, PartialEq)]
pub struct SizeFailure {
    pub kernel_name: String,
    pub data_size_bytes: u64,
    pub reason: String,
    pub completed: Vec<BenchmarkRun>,
    pub remaining: Vec<u64>,
}

/// Errors surfaced to callers of the executor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutorError {
    #[error("invalid benchmark request: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to compile kernel '{kernel}': {log}")]
    Compile { kernel: String, log: String },

    /// Backend call failed; the session was restarted and the call was not retried.
    #[error("execution failed (session restarted): {reason}")]
    Execution { reason: String },

    #[error(
        "kernel '{}' failed at {} bytes (session restarted, {} size(s) completed): {}",
        .0.kernel_name, .0.data_size_bytes, .0.completed.len(), .0.reason
    )]
    SizeFailed(Box<SizeFailure>),

    /// Backend refused an operation without faulting; the session is unchanged.
    #[error("backend error: {reason}")]
    Backend { reason: String },

    /// Restart after an execution failure failed. No further backend calls are attempted.
    #[error("unrecoverable backend condition: {reason}")]
    Unrecoverable { reason: String },

    #[error(
        "cannot start session on platform {platform} device {device}: {reason}"
    )]
    SessionInit {
        platform: usize,
        device: usize,
        reason: String,
    },

    #[error("session is not running (state: {state})")]
    SessionUnavailable { state: SessionState },

    #[error("failed to serialize report: {0}")]
    Serialize(String),
}

impl ExecutorError {
    /// True when the session survived and the operation may be re-issued.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Execution { .. } | Self::SizeFailed(_))
    }

    /// True when the process must not talk to the backend again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unrecoverable { .. })
    }

    /// The failure context for a sweep interrupted at one data size.
    pub fn size_failure(&self) -> Option<&SizeFailure> {
        match self {
            Self::SizeFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ExecutorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_and_allocation_trigger_recovery() {
        assert!(BackendError::Execution("fault".into()).is_execution_failure());
        let oom = BackendError::Allocation {
            bytes: 4,
            reason: "oom".into(),
        };
        assert!(oom.is_execution_failure());
        let syntax = BackendError::Compile {
            kernel: "k".into(),
            log: "".into(),
        };
        assert!(!syntax.is_execution_failure());
        assert!(!BackendError::Shutdown("x".into()).is_execution_failure());
    }

    #[test]
    fn recoverable_classification() {
        let execution = ExecutorError::Execution { reason: "x".into() };
        assert!(execution.is_recoverable());
        assert!(!ExecutorError::Validation(ValidationError::NoDataSizes).is_recoverable());
        let backend = ExecutorError::Backend { reason: "x".into() };
        assert!(!backend.is_recoverable());
        assert!(!backend.is_fatal());
        let unrecoverable = ExecutorError::Unrecoverable { reason: "x".into() };
        assert!(!unrecoverable.is_recoverable());
        assert!(unrecoverable.is_fatal());
    }

    #[test]
    fn validation_messages_name_the_offender() {
        let err = ExecutorError::from(ValidationError::NonPositiveIterations(0));
        assert_eq!(
            err.to_string(),
            "invalid benchmark request: illegal number of executions: 0"
        );
        let err = ValidationError::NonPositiveDataSize { index: 2, value: 0 };
        assert!(err.to_string().contains("index 2"));
    }

    #[test]
    fn invalid_timeout_compares_by_value() {
        let err = ValidationError::InvalidTimeout(-1.5);
        assert_eq!(err, ValidationError::InvalidTimeout(-1.5));
        assert_ne!(err, ValidationError::InvalidTimeout(2.0));
        assert_eq!(
            ExecutorError::from(err.clone()),
            ExecutorError::Validation(err)
        );
    }
}
