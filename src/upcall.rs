//! The upcall dispatch table (§4.7).
//!
//! Generalizes xv6's `Syscall` enum — a `TryFrom<usize>` over
//! a small integer code, matched in a `call()` method — from a kernel's
//! syscall table to this runtime's upcall table. Same shape, different
//! service list: logging, allocation, proc/port/channel lifecycle, and the
//! rendezvous primitives instead of file and process syscalls.

use crate::alloc::{rt_free, rt_malloc};
use crate::diagnostics::rt_info;
use crate::error::{Result, RuntimeError};
use crate::proc::{Proc, ProcState, ProgramDescriptor};
use crate::rendezvous::{rendezvous, Channel, Port};
use crate::runtime::Runtime;
use crate::scheduler::pick_index;
use std::ffi::CStr;

/// One of the thirteen services a proc can request while `CallingC`.
///
/// Matches §4.7's table exactly; the numeric values are load-bearing, since
/// generated code writes them as plain integers into `upcall_code`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Upcall {
    LogUint32 = 0,
    LogStr = 1,
    Spawn = 2,
    CheckExpr = 3,
    Malloc = 4,
    Free = 5,
    NewPort = 6,
    DelPort = 7,
    NewChan = 8,
    DelChan = 9,
    Send = 10,
    Recv = 11,
    Sched = 12,
}

impl TryFrom<u32> for Upcall {
    type Error = ();

    fn try_from(code: u32) -> Result<Upcall, ()> {
        Ok(match code {
            0 => Upcall::LogUint32,
            1 => Upcall::LogStr,
            2 => Upcall::Spawn,
            3 => Upcall::CheckExpr,
            4 => Upcall::Malloc,
            5 => Upcall::Free,
            6 => Upcall::NewPort,
            7 => Upcall::DelPort,
            8 => Upcall::NewChan,
            9 => Upcall::DelChan,
            10 => Upcall::Send,
            11 => Upcall::Recv,
            12 => Upcall::Sched,
            _ => return Err(()),
        })
    }
}

impl Upcall {
    /// Perform the named service against `proc`, which must currently be in
    /// `CallingC` with its code/args already written by generated code.
    ///
    /// Returns `Err` only for the one upcall whose failure is fatal to the
    /// whole program (`Malloc` exhaustion, §5/§7(a)); every other upcall
    /// either succeeds or reports its failure back through the proc's own
    /// out-pointer/state, not through this `Result`.
    pub fn dispatch(self, proc_ptr: *mut Proc, runtime: &mut Runtime) -> Result<()> {
        match self {
            Upcall::LogUint32 => {
                let value = unsafe { (*proc_ptr).arg(0) };
                rt_info!("{value}");
            }
            Upcall::LogStr => {
                let ptr = unsafe { (*proc_ptr).arg(0) } as *const std::ffi::c_char;
                let message = unsafe { CStr::from_ptr(ptr) }.to_string_lossy();
                rt_info!("{message}");
            }
            Upcall::Spawn => {
                let program = unsafe { (*proc_ptr).arg(1) } as *const ProgramDescriptor;
                let child = runtime.spawn(program);
                unsafe {
                    let out = (*proc_ptr).arg(0) as *mut u64;
                    out.write(child as u64);
                }
            }
            Upcall::CheckExpr => {
                let truthy = unsafe { (*proc_ptr).arg(0) };
                if truthy == 0 {
                    unsafe {
                        (*proc_ptr).state = ProcState::Exiting;
                    }
                }
            }
            Upcall::Malloc => {
                let count = unsafe { (*proc_ptr).arg(1) } as usize;
                let out = unsafe { (*proc_ptr).arg(0) } as *mut u64;
                match rt_malloc(count) {
                    Some(ptr) => unsafe { out.write(ptr as u64) },
                    // §5/§7(a): allocation failure is fatal, not a null
                    // returned to generated code to paper over.
                    None => return Err(RuntimeError::AllocationFailed),
                }
            }
            Upcall::Free => {
                let ptr = unsafe { (*proc_ptr).arg(0) } as *mut u8;
                if !ptr.is_null() {
                    unsafe { rt_free(ptr) };
                }
            }
            Upcall::NewPort => {
                let port = Port::new(proc_ptr);
                let out = unsafe { (*proc_ptr).arg(0) } as *mut u64;
                unsafe { out.write(Box::into_raw(port) as u64) };
            }
            Upcall::DelPort => {
                let port = unsafe { (*proc_ptr).arg(0) } as *mut Port;
                let owned = unsafe { Box::from_raw(port) };
                assert_eq!(owned.live_refcount, 0, "port freed with live refcount");
                if !owned.owner.is_null() {
                    unsafe { (*owned.owner).dec_ref() };
                }
                owned.writers.finalize();
            }
            Upcall::NewChan => {
                let port = unsafe { (*proc_ptr).arg(1) } as *mut Port;
                let chan = Channel::new(port);
                let out = unsafe { (*proc_ptr).arg(0) } as *mut u64;
                unsafe { out.write(Box::into_raw(chan) as u64) };
            }
            Upcall::DelChan => {
                let chan = unsafe { (*proc_ptr).arg(1) } as *mut Channel;
                let owned = unsafe { Box::from_raw(chan) };
                // Only still holding a hold on `owned.proc` if a send is
                // queued and hasn't rendezvoused yet; a completed send
                // already released it (see `handle_send`/`handle_recv`).
                if owned.queued {
                    unsafe { (*owned.proc).dec_ref() };
                }
            }
            Upcall::Send => handle_send(proc_ptr, runtime),
            Upcall::Recv => handle_recv(proc_ptr, runtime),
            Upcall::Sched => {
                let child = unsafe { (*proc_ptr).arg(0) } as *mut Proc;
                unsafe { runtime.enqueue(child) };
            }
        }
        Ok(())
    }
}

fn handle_send(proc_ptr: *mut Proc, runtime: &mut Runtime) {
    let chan = unsafe { (*proc_ptr).arg(0) } as *mut Channel;
    unsafe {
        (*chan).proc = proc_ptr;
        (*proc_ptr).inc_ref();
    }

    runtime.move_to_blocked(proc_ptr, ProcState::BlockedWriting);

    let port = unsafe { (*chan).port };
    let owner = unsafe { (*port).owner };

    let rendezvous_ok = if !owner.is_null() {
        unsafe { rendezvous(&mut *proc_ptr, &mut *owner) }
    } else {
        false
    };

    if rendezvous_ok {
        unsafe { (*proc_ptr).dec_ref() };
        runtime.move_to_runnable(proc_ptr);
        runtime.move_to_runnable(owner);
    } else if owner.is_null() {
        rt_info!("DEAD SEND");
    } else {
        let already_queued = unsafe { (*chan).queued };
        if !already_queued {
            let writers = unsafe { &mut (*port).writers };
            let idx = writers.push(chan);
            unsafe {
                (*chan).idx = idx;
                (*chan).queued = true;
            }
        }
    }
}

fn handle_recv(proc_ptr: *mut Proc, runtime: &mut Runtime) {
    runtime.move_to_blocked(proc_ptr, ProcState::BlockedReading);

    let port = unsafe { (*proc_ptr).arg(1) } as *mut Port;
    debug_assert_eq!(unsafe { (*port).owner }, proc_ptr);

    let writer_count = unsafe { (*port).writers.len() };
    if writer_count == 0 {
        return;
    }

    let i = pick_index(&mut runtime.rng, writer_count);
    let chan = *unsafe { (*port).writers.get(i) }.expect("index from pick_index is in bounds");
    let writer = unsafe { (*chan).proc };

    let rendezvous_ok = unsafe { rendezvous(&mut *writer, &mut *proc_ptr) };
    if rendezvous_ok {
        let writers = unsafe { &mut (*port).writers };
        writers.swap_remove(i, |moved, new_idx| unsafe {
            (**moved).idx = new_idx;
        });
        writers.trim();
        unsafe {
            (*chan).queued = false;
            (*writer).dec_ref();
        }
        runtime.move_to_runnable(writer);
        runtime.move_to_runnable(proc_ptr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    extern "C" fn noop(_env: *mut std::ffi::c_void, _proc: *mut Proc) {}

    fn descriptor() -> Box<ProgramDescriptor> {
        Box::new(ProgramDescriptor {
            init_code: noop,
            main_code: noop,
            fini_code: noop,
        })
    }

    fn calling_c_proc(program: &ProgramDescriptor) -> Box<Proc> {
        let mut proc = Proc::new(std::ptr::null_mut(), program as *const _);
        proc.state = ProcState::CallingC;
        proc
    }

    #[test]
    fn log_uint32_does_not_panic() {
        let program = descriptor();
        let mut proc = calling_c_proc(&program);
        let mut runtime = Runtime::with_seed(1);
        proc.set_arg(0, 42);
        Upcall::LogUint32.dispatch(&mut *proc as *mut Proc, &mut runtime).unwrap();
    }

    #[test]
    fn log_str_reads_the_c_string() {
        let program = descriptor();
        let mut proc = calling_c_proc(&program);
        let mut runtime = Runtime::with_seed(1);
        let message = CString::new("hi").unwrap();
        proc.set_arg(0, message.as_ptr() as u64);
        Upcall::LogStr.dispatch(&mut *proc as *mut Proc, &mut runtime).unwrap();
    }

    #[test]
    fn check_expr_false_marks_exiting() {
        let program = descriptor();
        let mut proc = calling_c_proc(&program);
        let mut runtime = Runtime::with_seed(1);
        proc.set_arg(0, 0);
        Upcall::CheckExpr.dispatch(&mut *proc as *mut Proc, &mut runtime).unwrap();
        assert_eq!(proc.state, ProcState::Exiting);
    }

    #[test]
    fn check_expr_true_leaves_state_alone() {
        let program = descriptor();
        let mut proc = calling_c_proc(&program);
        let mut runtime = Runtime::with_seed(1);
        proc.set_arg(0, 1);
        Upcall::CheckExpr.dispatch(&mut *proc as *mut Proc, &mut runtime).unwrap();
        assert_eq!(proc.state, ProcState::CallingC);
    }

    #[test]
    fn malloc_then_free_round_trips() {
        let program = descriptor();
        let mut proc = calling_c_proc(&program);
        let mut runtime = Runtime::with_seed(1);

        let mut out: u64 = 0;
        proc.set_arg(0, &mut out as *mut u64 as u64);
        proc.set_arg(1, 64);
        Upcall::Malloc.dispatch(&mut *proc as *mut Proc, &mut runtime).unwrap();
        assert_ne!(out, 0);

        proc.set_arg(0, out);
        Upcall::Free.dispatch(&mut *proc as *mut Proc, &mut runtime).unwrap();
    }

    #[test]
    fn new_port_then_del_port_round_trips() {
        let program = descriptor();
        let mut proc = calling_c_proc(&program);
        let mut runtime = Runtime::with_seed(1);

        let mut out: u64 = 0;
        proc.set_arg(0, &mut out as *mut u64 as u64);
        Upcall::NewPort.dispatch(&mut *proc as *mut Proc, &mut runtime).unwrap();
        assert_ne!(out, 0);

        let port = out as *mut Port;
        unsafe { (*port).live_refcount = 0 };
        proc.set_arg(0, out);
        Upcall::DelPort.dispatch(&mut *proc as *mut Proc, &mut runtime).unwrap();
    }

    #[test]
    #[should_panic(expected = "live refcount")]
    fn del_port_with_live_refcount_panics() {
        let program = descriptor();
        let mut proc = calling_c_proc(&program);
        let mut runtime = Runtime::with_seed(1);

        let mut out: u64 = 0;
        proc.set_arg(0, &mut out as *mut u64 as u64);
        Upcall::NewPort.dispatch(&mut *proc as *mut Proc, &mut runtime).unwrap();

        proc.set_arg(0, out);
        Upcall::DelPort.dispatch(&mut *proc as *mut Proc, &mut runtime).unwrap();
    }

    #[test]
    fn new_chan_then_del_chan_round_trips() {
        let program = descriptor();
        let mut proc = calling_c_proc(&program);
        let mut runtime = Runtime::with_seed(1);

        let mut port_out: u64 = 0;
        proc.set_arg(0, &mut port_out as *mut u64 as u64);
        Upcall::NewPort.dispatch(&mut *proc as *mut Proc, &mut runtime).unwrap();

        let mut chan_out: u64 = 0;
        proc.set_arg(0, &mut chan_out as *mut u64 as u64);
        proc.set_arg(1, port_out);
        Upcall::NewChan.dispatch(&mut *proc as *mut Proc, &mut runtime).unwrap();
        assert_ne!(chan_out, 0);

        proc.set_arg(1, chan_out);
        Upcall::DelChan.dispatch(&mut *proc as *mut Proc, &mut runtime).unwrap();

        unsafe { (*(port_out as *mut Port)).live_refcount = 0 };
        proc.set_arg(0, port_out);
        Upcall::DelPort.dispatch(&mut *proc as *mut Proc, &mut runtime).unwrap();
    }

    #[test]
    fn sched_enqueues_a_spawned_proc() {
        let program = descriptor();
        let mut runtime = Runtime::with_seed(1);
        let child = runtime.spawn(&*program as *const _);

        let mut proc = calling_c_proc(&program);
        proc.set_arg(0, child as u64);
        Upcall::Sched.dispatch(&mut *proc as *mut Proc, &mut runtime).unwrap();
        assert_eq!(runtime.runnable_len(), 1);
    }

    /// Exercises the "queued sender" path (§8 scenario 4) directly: two
    /// procs already `BlockedWriting` with channels already queued on a
    /// port, then one `recv` dispatch. Built white-box (pools and the
    /// writer queue populated directly) rather than through a scripted
    /// two-proc run, since the actual writer chosen depends on the PRNG
    /// draw and a real scheduler-driven race between the senders and the
    /// receiver would make the "both queued before recv" precondition
    /// flaky to arrange.
    #[test]
    fn recv_selects_one_queued_writer_and_dequeues_it() {
        let program = descriptor();
        let mut runtime = Runtime::with_seed(7);

        let mut reader = Proc::new(std::ptr::null_mut(), &*program as *const _);
        reader.state = ProcState::Running;
        let reader_idx = runtime.runnable.push(reader);
        runtime.runnable.get_mut(reader_idx).unwrap().idx = reader_idx;
        let reader_ptr: *mut Proc = &mut **runtime.runnable.get_mut(reader_idx).unwrap();

        let mut writer1 = Proc::new(std::ptr::null_mut(), &*program as *const _);
        writer1.state = ProcState::BlockedWriting;
        writer1.upcall_args[1] = 0x11;
        writer1.inc_ref(); // simulates the hold `handle_send` would have taken
        let w1_idx = runtime.blocked.push(writer1);
        runtime.blocked.get_mut(w1_idx).unwrap().idx = w1_idx;
        let writer1_ptr: *mut Proc = &mut **runtime.blocked.get_mut(w1_idx).unwrap();

        let mut writer2 = Proc::new(std::ptr::null_mut(), &*program as *const _);
        writer2.state = ProcState::BlockedWriting;
        writer2.upcall_args[1] = 0x22;
        writer2.inc_ref(); // simulates the hold `handle_send` would have taken
        let w2_idx = runtime.blocked.push(writer2);
        runtime.blocked.get_mut(w2_idx).unwrap().idx = w2_idx;
        let writer2_ptr: *mut Proc = &mut **runtime.blocked.get_mut(w2_idx).unwrap();

        let port_ptr = Box::into_raw(Port::new(reader_ptr));
        let chan1_ptr = Box::into_raw(Channel::new(port_ptr));
        let chan2_ptr = Box::into_raw(Channel::new(port_ptr));
        unsafe {
            (*chan1_ptr).proc = writer1_ptr;
            (*chan1_ptr).queued = true;
            (*chan2_ptr).proc = writer2_ptr;
            (*chan2_ptr).queued = true;
            let i1 = (*port_ptr).writers.push(chan1_ptr);
            (*chan1_ptr).idx = i1;
            let i2 = (*port_ptr).writers.push(chan2_ptr);
            (*chan2_ptr).idx = i2;
        }

        let mut result: u64 = 0;
        unsafe {
            (*reader_ptr).state = ProcState::CallingC;
            (*reader_ptr).set_arg(0, &mut result as *mut u64 as u64);
            (*reader_ptr).set_arg(1, port_ptr as u64);
        }

        Upcall::Recv.dispatch(reader_ptr, &mut runtime).unwrap();

        assert!(result == 0x11 || result == 0x22);
        assert_eq!(unsafe { (*reader_ptr).state }, ProcState::Running);
        assert_eq!(runtime.blocked_len(), 1, "the other writer stays queued");
        assert_eq!(runtime.runnable_len(), 2, "reader and the chosen writer are runnable");
        assert_eq!(unsafe { (*port_ptr).writers.len() }, 1);

        unsafe {
            drop(Box::from_raw(chan1_ptr));
            drop(Box::from_raw(chan2_ptr));
            drop(Box::from_raw(port_ptr));
        }
    }

    /// §8 scenario 5: sending on a channel whose port has no owner leaves
    /// the sender permanently `BlockedWriting` rather than rendezvousing or
    /// panicking.
    #[test]
    fn send_on_an_ownerless_port_is_a_dead_send() {
        let program = descriptor();
        let mut runtime = Runtime::with_seed(1);

        let mut sender = Proc::new(std::ptr::null_mut(), &*program as *const _);
        sender.state = ProcState::Running;
        let idx = runtime.runnable.push(sender);
        runtime.runnable.get_mut(idx).unwrap().idx = idx;
        let sender_ptr: *mut Proc = &mut **runtime.runnable.get_mut(idx).unwrap();

        let port_ptr = Box::into_raw(Port::new(std::ptr::null_mut()));
        let chan_ptr = Box::into_raw(Channel::new(port_ptr));

        unsafe {
            (*sender_ptr).state = ProcState::CallingC;
            (*sender_ptr).set_arg(0, chan_ptr as u64);
            (*sender_ptr).set_arg(1, 0x2A);
        }

        Upcall::Send.dispatch(sender_ptr, &mut runtime).unwrap();

        assert_eq!(unsafe { (*sender_ptr).state }, ProcState::BlockedWriting);
        assert_eq!(runtime.blocked_len(), 1);
        assert_eq!(runtime.runnable_len(), 0);
        assert!(!unsafe { (*chan_ptr).queued }, "a dead send never queues");

        unsafe {
            drop(Box::from_raw(chan_ptr));
            drop(Box::from_raw(port_ptr));
        }
    }
}
