//! The context-switch contract between the runtime and a proc (§4.4).
//!
//! The xv6 kernel calls straight into an `extern "C" fn swtch(...)`
//! assembly routine from `sched()`. This runtime's switch primitives are
//! equally out of scope to emit — they're still hand-written assembly
//! supplied by the embedder — but the *call site* is abstracted behind a
//! trait instead of a bare `extern "C"` pair, so the main loop (§4.9) can be
//! driven end-to-end in host tests by [`MockGlue`] without linking any
//! assembly at all. A production embedder supplies [`ForeignGlue`], which
//! wraps the real `extern "C"` entry point the embedder hands in.

use crate::proc::{Proc, ProcState};

/// Enters a proc and returns control to the runtime once the proc yields.
///
/// A single call to `enter` corresponds to one full `c_to_proc` / (proc
/// runs) / `proc_to_c` round trip. On return, `proc.state` holds whatever
/// the proc last wrote before yielding — per §4.4's contract, always one of
/// `CallingC`, `Exiting`, `BlockedReading`, or `BlockedWriting` (never
/// `Running`; that would mean the proc never yielded at all).
pub trait ProcGlue {
    fn enter(&mut self, proc: &mut Proc);
}

/// Real context switch, wrapping the `c_to_proc` primitive specified in
/// §4.4.
///
/// `c_to_proc` itself isn't implemented here — it's target-specific
/// assembly, supplied by whatever embeds this runtime — but unlike a bare
/// `extern "C"` pair resolved at link time, the embedder hands the function
/// pointer in explicitly through [`ForeignGlue::new`] (§6, "Embedder entry
/// point"). This type only owns the calling convention: save the host SP,
/// call in, and trust the proc to come back out through `proc_to_c`.
pub struct ForeignGlue {
    c_to_proc: unsafe extern "C" fn(*mut Proc),
}

impl ForeignGlue {
    /// `c_to_proc` saves the host's callee-saves and SP, loads the proc's
    /// SP, restores its callee-saves from its stack top, and branches to
    /// its activation PC.
    pub fn new(c_to_proc: unsafe extern "C" fn(*mut Proc)) -> Self {
        ForeignGlue { c_to_proc }
    }
}

impl ProcGlue for ForeignGlue {
    fn enter(&mut self, proc: &mut Proc) {
        unsafe { (self.c_to_proc)(proc as *mut Proc) }
    }
}

/// Host-testable stand-in for [`ForeignGlue`].
///
/// Rather than touch any registers, `enter` simulates a proc that always
/// immediately issues an upcall: it flips `proc.state` straight to
/// `CallingC`, the one transition a real activation record can't skip
/// (per the Design Notes, "a direct function call that flips proc state").
/// Test code pre-loads `upcall_code`/`upcall_args` on the proc before
/// driving the loop; the dispatcher takes it from there, and any further
/// state change (`Exiting`, a `Blocked*` variant) comes out of the upcall
/// handler itself rather than out of `enter`.
#[derive(Default)]
pub struct MockGlue;

impl ProcGlue for MockGlue {
    fn enter(&mut self, proc: &mut Proc) {
        proc.state = ProcState::CallingC;
    }
}
