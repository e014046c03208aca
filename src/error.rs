//! Error types for the runtime.
//!
//! The xv6 kernel represents recoverable conditions with a hand-rolled
//! `ProcessError` enum and reserves `panic!` for conditions that indicate a
//! bug rather than a runtime condition (lock misuse, scheduler invariants).
//! This crate keeps that split but expresses the enum with `thiserror`,
//! since the runtime is a hosted library rather than the sole occupant of
//! an address space: it must hand failures back to its embedder instead of
//! tearing down the process itself.

use thiserror::Error;

/// Fatal conditions the runtime can report back to its embedder.
///
/// Protocol violations (a blocked proc state reaching the main loop, a
/// broken pool invariant) are *not* represented here: those indicate a bug
/// in generated code or in the runtime itself and are raised as panics
/// rather than reported here (§7).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// The runnable pool emptied out while the blocked pool was still
    /// non-empty: no proc can ever make progress again.
    #[error("no schedulable processes")]
    Deadlock,

    /// A heap allocation needed to create a proc, stack, port, or channel
    /// could not be satisfied.
    #[error("allocation failed")]
    AllocationFailed,
}

impl RuntimeError {
    /// The process exit code this error maps to, per §7 and the generated-code ABI.
    pub fn exit_code(&self) -> i32 {
        match self {
            RuntimeError::Deadlock => crate::config::EXIT_CODE_DEADLOCK,
            RuntimeError::AllocationFailed => crate::config::EXIT_CODE_ALLOCATION_FAILURE,
        }
    }
}

/// Result alias used throughout the crate for fallible runtime operations.
pub type Result<T> = core::result::Result<T, RuntimeError>;
