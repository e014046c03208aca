//! Tunable limits for the runtime.
//!
//! Mirrors the role of the xv6 kernel's `param.rs`: one place to look for
//! every compile-time constant that shapes allocation sizes and capacities.

/// Initial (and minimum) capacity of a [`crate::pointer_vec::PointerVec`].
///
/// The pointer-vector never shrinks below this, and always starts here.
pub const POINTER_VEC_MIN_CAPACITY: usize = 8;

/// Usable byte size of a freshly allocated stack segment.
pub const STACK_SEGMENT_SIZE: usize = 65536;

/// Byte size of the inline slot region allocated alongside every proc record.
///
/// Reserved for the embedder/generated code; the core itself never reads or
/// writes into it beyond allocating and freeing the space with the proc.
pub const PROC_INLINE_SLOTS_SIZE: usize = 1024;

/// Number of callee-saved registers in the initial synthetic frame (§4.3).
///
/// Four on the reference target (`riscv`-style callee-save count); kept as a
/// named constant since the exact count is an ABI detail of the target, not
/// a property of the runtime's algorithm.
pub const CALLEE_SAVE_COUNT: usize = 4;

/// Number of upcall argument slots carried inline on every [`crate::proc::Proc`].
pub const UPCALL_ARG_COUNT: usize = 8;

/// Stack-pointer alignment required before writing the initial frame.
pub const STACK_ALIGNMENT: usize = 16;

/// Process exit code used when an allocation cannot be satisfied (§5, §7).
pub const EXIT_CODE_ALLOCATION_FAILURE: i32 = 123;

/// Process exit code used when the runtime detects deadlock (§7).
pub const EXIT_CODE_DEADLOCK: i32 = 1;
