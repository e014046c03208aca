//! The runtime record and main loop (§3 "Runtime", §4.9).
//!
//! Plays the role of the xv6 kernel's global `proc` table plus
//! `scheduler()`, collapsed into one owned value instead of statics, since
//! this runtime is a library an embedder can instantiate more than once
//! rather than the sole kernel image in an address space.

use crate::diagnostics::{rt_error, rt_info};
use crate::error::{Result, RuntimeError};
use crate::glue::ProcGlue;
use crate::pointer_vec::PointerVec;
use crate::proc::context::Context;
use crate::proc::{Proc, ProcState, ProgramDescriptor};
use crate::scheduler::pick_index;
use crate::upcall::Upcall;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Holds the saved host context, the two scheduling pools, and the PRNG.
///
/// `host_context`'s `sp`/`ra` are the C-register save area described in §6:
/// the context switch glue saves the embedder's registers there before
/// entering a proc, and restores them from there on the way back out.
/// `#[repr(C)]` and `host_context` being the first field together put
/// `ra`/`sp` at fixed word offsets 0/1 from the start of `Runtime`, the
/// offsets §6 documents for the host's saved PC/SP.
#[repr(C)]
pub struct Runtime {
    pub(crate) host_context: Context,
    pub(crate) current: *mut Proc,
    pub(crate) runnable: PointerVec<Box<Proc>>,
    pub(crate) blocked: PointerVec<Box<Proc>>,
    pub(crate) rng: StdRng,
}

impl Runtime {
    fn new(rng: StdRng) -> Runtime {
        Runtime {
            host_context: Context::new(),
            current: std::ptr::null_mut(),
            runnable: PointerVec::new(),
            blocked: PointerVec::new(),
            rng,
        }
    }

    fn with_entropy() -> Runtime {
        Runtime::new(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Runtime {
        Runtime::new(StdRng::seed_from_u64(seed))
    }

    /// Spawn a proc for `program` without enqueuing it (§4.7, upcall 2).
    /// Ownership passes to the caller, who must eventually hand it to
    /// [`Runtime::enqueue`] (upcall 12) or free it directly.
    pub fn spawn(&mut self, program: *const ProgramDescriptor) -> *mut Proc {
        let proc = Proc::new(self as *mut Runtime, program);
        Box::into_raw(proc)
    }

    /// Enqueue a proc created by [`Runtime::spawn`] into the runnable pool
    /// (§4.7, upcall 12).
    ///
    /// # Safety
    /// `proc` must be a still-owned pointer from `spawn`, not already
    /// enqueued or freed.
    pub unsafe fn enqueue(&mut self, proc: *mut Proc) {
        let mut owned = Box::from_raw(proc);
        owned.state = ProcState::Running;
        let idx = self.runnable.push(owned);
        (*proc).idx = idx;
    }

    /// Move a proc from the runnable pool into the blocked pool, per §4.5's
    /// "every transition between state classes must move the proc between
    /// pools". Used by the send/recv upcalls before attempting rendezvous.
    pub(crate) fn move_to_blocked(&mut self, proc: *mut Proc, new_state: ProcState) {
        debug_assert!(new_state.is_blocked_class());
        unsafe {
            let idx = (*proc).idx;
            let mut owned = self.runnable.swap_remove(idx, |moved, new_idx| moved.idx = new_idx);
            owned.state = new_state;
            let new_idx = self.blocked.push(owned);
            (*proc).idx = new_idx;
        }
    }

    /// Move a proc from the blocked pool back into the runnable pool.
    /// Caller must already have set `proc.state` to `Running` — this is
    /// the other half of §4.5's cross-class pool move, used after a
    /// successful rendezvous.
    pub(crate) fn move_to_runnable(&mut self, proc: *mut Proc) {
        unsafe {
            debug_assert_eq!((*proc).state, ProcState::Running);
            let idx = (*proc).idx;
            let mut owned = self.blocked.swap_remove(idx, |moved, new_idx| moved.idx = new_idx);
            owned.state = ProcState::Running;
            let new_idx = self.runnable.push(owned);
            (*proc).idx = new_idx;
        }
    }

    pub fn runnable_len(&self) -> usize {
        self.runnable.len()
    }

    pub fn blocked_len(&self) -> usize {
        self.blocked.len()
    }
}

/// Run a program to completion (§4.9).
///
/// Constructs a runtime, spawns the root proc from `program`, and loops:
/// schedule a runnable proc, enter it through `glue`, and act on the state
/// it yields in. Returns the program's exit code, or the fatal
/// [`RuntimeError`] that ended it early.
pub fn run_program<G: ProcGlue>(
    program: *const ProgramDescriptor,
    glue: &mut G,
    seed: Option<u64>,
) -> Result<i32> {
    let mut runtime = match seed {
        Some(seed) => Runtime::with_seed(seed),
        None => Runtime::with_entropy(),
    };

    let root = Proc::new(&mut runtime as *mut Runtime, program);
    let idx = runtime.runnable.push(root);
    if let Some(p) = runtime.runnable.get_mut(idx) {
        p.idx = idx;
    }

    let exit_code = run_loop(&mut runtime, glue)?;
    runtime.blocked.finalize();
    runtime.runnable.finalize();
    Ok(exit_code)
}

fn run_loop<G: ProcGlue>(runtime: &mut Runtime, glue: &mut G) -> Result<i32> {
    loop {
        if runtime.runnable.is_empty() {
            if runtime.blocked.is_empty() {
                return Ok(0);
            }
            rt_error!("no schedulable processes");
            return Err(RuntimeError::Deadlock);
        }

        let i = pick_index(&mut runtime.rng, runtime.runnable.len());
        let proc_ptr: *mut Proc = {
            let slot = runtime.runnable.get_mut(i).expect("index from pick_index is in bounds");
            slot.state = ProcState::Running;
            &mut **slot as *mut Proc
        };

        runtime.current = proc_ptr;
        glue.enter(unsafe { &mut *proc_ptr });
        runtime.current = std::ptr::null_mut();

        let state = unsafe { (*proc_ptr).state };
        match state {
            ProcState::Running => {
                // Contract violation in a production glue, but harmless to
                // just reschedule: nothing in this proc's bookkeeping needs
                // to change.
            }
            ProcState::CallingC => {
                dispatch(proc_ptr, runtime)?;
                // A `CheckExpr` failure (or any other handler) may have left
                // the proc `Exiting` mid-dispatch; reap it right away rather
                // than resetting it to `Running` and resurrecting it on the
                // next round. A handler that moved the proc to a blocked
                // state already relocated it into the blocked pool, so
                // there's nothing left to do for that case here.
                match unsafe { (*proc_ptr).state } {
                    ProcState::CallingC => unsafe { (*proc_ptr).state = ProcState::Running },
                    ProcState::Exiting => free_exited(proc_ptr, runtime),
                    _ => {}
                }
            }
            ProcState::Exiting => free_exited(proc_ptr, runtime),
            ProcState::BlockedReading | ProcState::BlockedWriting => {
                panic!("protocol violation: proc entered a blocked state without going through an upcall");
            }
        }
    }
}

/// Swap-remove an `Exiting` proc out of the runnable pool and drop it.
///
/// # Panics
/// Panics if the proc is still referenced by a live port or channel (§3
/// invariant v) — freeing it anyway would leave a dangling back-reference.
fn free_exited(proc_ptr: *mut Proc, runtime: &mut Runtime) {
    let idx = unsafe { (*proc_ptr).idx };
    let freed = runtime
        .runnable
        .swap_remove(idx, |moved, new_idx| moved.idx = new_idx);
    assert_eq!(freed.refcount, 0, "proc freed while still referenced");
}

fn dispatch(proc_ptr: *mut Proc, runtime: &mut Runtime) -> Result<()> {
    let code = unsafe { (*proc_ptr).upcall_code };
    let result = match Upcall::try_from(code) {
        Ok(upcall) => upcall.dispatch(proc_ptr, runtime),
        Err(_) => {
            rt_info!("unknown upcall code {code}");
            Ok(())
        }
    };
    unsafe {
        (*proc_ptr).clear_upcall();
    }
    result
}
