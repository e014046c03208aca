//! The proc record: a lightweight cooperative task with its own stack.
//!
//! Corresponds to the xv6 kernel's `Process` (in `proc/process.rs`):
//! same idea of a pool-managed, state-machine-driven task record with an
//! owned stack and a saved context, generalized from a preemptible kernel
//! thread with a page table to a cooperative green thread with none.

pub mod context;

use crate::config::{
    CALLEE_SAVE_COUNT, PROC_INLINE_SLOTS_SIZE, STACK_ALIGNMENT, UPCALL_ARG_COUNT,
};
use crate::runtime::Runtime;
use crate::stack::StackSegment;
use context::Context;
use std::mem::size_of;

/// Three entry points an embedder supplies for a program: init, main, and
/// fini code, each taking an opaque environment pointer and a proc pointer
/// (§6, "Embedder entry point").
#[repr(C)]
#[derive(Copy, Clone)]
pub struct ProgramDescriptor {
    pub init_code: extern "C" fn(*mut std::ffi::c_void, *mut Proc),
    pub main_code: extern "C" fn(*mut std::ffi::c_void, *mut Proc),
    pub fini_code: extern "C" fn(*mut std::ffi::c_void, *mut Proc),
}

/// A proc's lifecycle state (§4.5).
///
/// The discriminants match §6's "process state codes" table exactly —
/// `Running` is deliberately zero so generated code can signal any
/// non-running transition with a bitwise OR against zero.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcState {
    Running = 0,
    CallingC = 1,
    Exiting = 2,
    BlockedReading = 3,
    BlockedWriting = 4,
}

impl ProcState {
    /// Running, CallingC, and Exiting live in the runnable pool (§3 invariant iii).
    pub fn is_runnable_class(&self) -> bool {
        matches!(self, ProcState::Running | ProcState::CallingC | ProcState::Exiting)
    }

    /// BlockedReading and BlockedWriting live in the blocked pool.
    pub fn is_blocked_class(&self) -> bool {
        matches!(self, ProcState::BlockedReading | ProcState::BlockedWriting)
    }
}

/// A lightweight task: owns a stack, an upcall-argument area, a saved stack
/// pointer, and a state (§3).
///
/// `#[repr(C)]` and field order both matter here: generated code's assembly
/// prologue indexes into a `Proc` by fixed word offset (0=runtime, 1=stack,
/// 2=program, 3=saved PC, 4=saved SP, 5=state, 6=refcount) per §6's ABI
/// table. `context` occupies offsets 3/4 since `Context` itself is
/// `#[repr(C)]` with `ra` then `sp` first (see `proc/context.rs`). Fields
/// after `refcount` are core-private bookkeeping the ABI table doesn't name
/// and must stay behind it.
#[repr(C)]
pub struct Proc {
    /// Back-reference to the owning runtime. Non-owning.
    pub runtime: *mut Runtime,
    /// Owning pointer to the proc's stack.
    pub stack: Box<StackSegment>,
    /// Back-reference to the program descriptor. Non-owning.
    pub program: *const ProgramDescriptor,
    /// Saved register state; `context.sp` is meaningful only while the proc
    /// isn't executing.
    pub context: Context,
    pub state: ProcState,
    /// A proc is never freed while referenced by a channel sending through
    /// it or a port it owns.
    pub refcount: u32,

    /// Position within whichever pool currently owns this proc.
    pub idx: usize,
    pub upcall_code: u32,
    pub upcall_args: [u64; UPCALL_ARG_COUNT],

    /// Inline slot region reserved for the embedder; the core only
    /// allocates and frees the space alongside the proc.
    inline_slots: Box<[u8]>,

    pub mem_budget: u64,
    pub mem_consumed: u64,
    pub tick_budget: u64,
    pub tick_consumed: u64,
}

impl Proc {
    /// Allocate a proc and its stack, and write the initial synthetic frame
    /// so that the first switch into it resumes at `program.main_code`
    /// (§4.3).
    pub fn new(runtime: *mut Runtime, program: *const ProgramDescriptor) -> Box<Proc> {
        let mut proc = Box::new(Proc {
            runtime,
            stack: Box::new(StackSegment::new()),
            program,
            context: Context::new(),
            state: ProcState::Running,
            refcount: 0,
            idx: 0,
            upcall_code: 0,
            upcall_args: [0; UPCALL_ARG_COUNT],
            inline_slots: vec![0u8; PROC_INLINE_SLOTS_SIZE].into_boxed_slice(),
            mem_budget: 0,
            mem_consumed: 0,
            tick_budget: 0,
            tick_consumed: 0,
        });

        let main_code = unsafe { (*program).main_code } as usize;
        let proc_ptr: *mut Proc = &mut *proc;
        let sp = write_initial_frame(&mut proc.stack, proc_ptr, main_code);
        proc.context.sp = sp;
        proc.context.ra = main_code;

        proc
    }

    pub fn arg(&self, index: usize) -> u64 {
        self.upcall_args[index]
    }

    pub fn set_arg(&mut self, index: usize, value: u64) {
        self.upcall_args[index] = value;
    }

    /// Zero the upcall code so generated code can signal the next upcall by
    /// writing a nonzero value without first reading the old one (§4.7).
    pub fn clear_upcall(&mut self) {
        self.upcall_code = 0;
    }

    pub fn inline_slots(&self) -> &[u8] {
        &self.inline_slots
    }

    pub fn inline_slots_mut(&mut self) -> &mut [u8] {
        &mut self.inline_slots
    }

    pub fn inc_ref(&mut self) {
        self.refcount += 1;
    }

    /// # Panics
    /// Panics on underflow: decrementing an unreferenced proc's refcount is
    /// a bug in the caller, not a runtime condition.
    pub fn dec_ref(&mut self) {
        self.refcount = self.refcount.checked_sub(1).expect("refcount underflow");
    }
}

/// Write the synthetic initial frame described in §4.3 at the top of
/// `stack`, and return the resulting initial stack pointer.
///
/// Layout, from the highest address down: the proc pointer, a fake
/// out-pointer and fake return PC (frame-shape parity only, never read),
/// the activation PC, then `CALLEE_SAVE_COUNT` zeroed callee-save slots.
/// The returned SP addresses the lowest of those slots.
fn write_initial_frame(stack: &mut StackSegment, proc_ptr: *mut Proc, main_code: usize) -> usize {
    let word = size_of::<usize>();
    let top = stack.end() as usize;
    let mut cursor = top & !(STACK_ALIGNMENT - 1);

    let mut write = |cursor: &mut usize, value: usize| {
        *cursor -= word;
        unsafe {
            (*cursor as *mut usize).write(value);
        }
    };

    write(&mut cursor, proc_ptr as usize);
    write(&mut cursor, 0); // fake outptr
    write(&mut cursor, 0); // fake return PC
    write(&mut cursor, main_code);
    for _ in 0..CALLEE_SAVE_COUNT {
        write(&mut cursor, 0);
    }

    cursor
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn noop(_env: *mut std::ffi::c_void, _proc: *mut Proc) {}

    fn descriptor() -> ProgramDescriptor {
        ProgramDescriptor {
            init_code: noop,
            main_code: noop,
            fini_code: noop,
        }
    }

    #[test]
    fn new_proc_starts_running_with_aligned_sp() {
        let program = descriptor();
        let proc = Proc::new(std::ptr::null_mut(), &program as *const _);
        assert_eq!(proc.state, ProcState::Running);
        assert_eq!(proc.context.sp % STACK_ALIGNMENT, 0);
        assert_eq!(proc.context.ra, noop as usize);
    }

    #[test]
    fn initial_sp_is_within_the_stack_body() {
        let program = descriptor();
        let mut proc = Proc::new(std::ptr::null_mut(), &program as *const _);
        let start = proc.stack.start() as usize;
        let end = proc.stack.end() as usize;
        assert!(proc.context.sp >= start && proc.context.sp < end);
    }

    #[test]
    fn refcount_round_trips() {
        let program = descriptor();
        let mut proc = Proc::new(std::ptr::null_mut(), &program as *const _);
        proc.inc_ref();
        proc.inc_ref();
        proc.dec_ref();
        assert_eq!(proc.refcount, 1);
    }
}
