//! Saved register state for a context switch.
//!
//! Directly descended from the xv6 kernel's `Context` (in
//! `proc/context.rs`): a return PC, a stack pointer, and the callee-saved
//! registers a `swtch`-style routine must preserve across a switch. The
//! xv6 hardcodes the riscv callee-save set as twelve named fields
//! (`s0`..`s11`); this runtime targets no fixed architecture, so the
//! callee-save set is a configurable-length array instead.

use crate::config::CALLEE_SAVE_COUNT;

/// Register save area for one side of a context switch.
///
/// `ra` and `sp` play the role of the ABI's "saved PC" and "saved SP" words
/// (offsets 3 and 4 in §6's proc layout); `callee_saves` holds whatever the
/// target's calling convention requires a callee to preserve across a call.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Context {
    /// Saved program counter: where execution resumes the next time a
    /// switch lands on whichever side owns this context.
    pub ra: usize,
    /// Saved stack pointer.
    pub sp: usize,
    pub callee_saves: [usize; CALLEE_SAVE_COUNT],
}

impl Context {
    pub const fn new() -> Context {
        Context {
            ra: 0,
            sp: 0,
            callee_saves: [0; CALLEE_SAVE_COUNT],
        }
    }
}
