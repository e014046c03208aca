//! Ports, channels, and the rendezvous engine (§4.8).
//!
//! Ports and channels are the two sides of a CSP-style handoff: a port is
//! owned by its single reader, a channel is a writer-side handle that
//! queues on a port when no rendezvous is immediately possible. Grounded on
//! the same non-owning-back-reference-plus-owning-forward-pointer shape the
//! xv6 uses for `Process::parent`/children, generalized from a process
//! tree to a reader/writer pair.

use crate::pointer_vec::PointerVec;
use crate::proc::{Proc, ProcState};

/// Owned by exactly one proc (its reader).
pub struct Port {
    /// Non-owning back-reference to the owning proc.
    pub owner: *mut Proc,
    pub live_refcount: u32,
    pub weak_refcount: u32,
    /// Channels currently queued to send through this port.
    pub writers: PointerVec<*mut Channel>,
}

impl Port {
    /// Holds a reference on `owner` for as long as the port exists (§3
    /// invariant v): the owning proc can't be freed out from under a port
    /// that still names it.
    pub fn new(owner: *mut Proc) -> Box<Port> {
        if !owner.is_null() {
            unsafe { (*owner).inc_ref() };
        }
        Box::new(Port {
            owner,
            live_refcount: 1,
            weak_refcount: 0,
            writers: PointerVec::new(),
        })
    }
}

/// Writer-side endpoint, bound to exactly one port.
pub struct Channel {
    /// Non-owning reference to the port this channel writes to.
    pub port: *mut Port,
    /// The proc that most recently used this channel to send.
    pub proc: *mut Proc,
    pub queued: bool,
    /// Position within `port.writers` while `queued`.
    pub idx: usize,
    /// Reserved for future buffered sends; the rendezvous engine never
    /// reads or writes it.
    overflow: Vec<u64>,
}

impl Channel {
    pub fn new(port: *mut Port) -> Box<Channel> {
        Box::new(Channel {
            port,
            proc: std::ptr::null_mut(),
            queued: false,
            idx: 0,
            overflow: Vec::new(),
        })
    }
}

/// Attempt a rendezvous between a blocked writer and a blocked reader.
///
/// Precondition: `src.state == BlockedWriting` and `dst.state ==
/// BlockedReading`. On success, transfers `src.upcall_args[1]` to the word
/// addressed by `dst.upcall_args[0]`, transitions both to `Running`, and
/// returns `true`. If the precondition doesn't hold, has no side effects
/// and returns `false` — the rendezvous engine doesn't handle composite
/// values; structured sends are a future extension (§4.8).
pub fn rendezvous(src: &mut Proc, dst: &mut Proc) -> bool {
    if src.state != ProcState::BlockedWriting || dst.state != ProcState::BlockedReading {
        return false;
    }

    let value = src.upcall_args[1];
    let dest_addr = dst.upcall_args[0] as *mut u64;
    unsafe {
        dest_addr.write(value);
    }

    src.state = ProcState::Running;
    dst.state = ProcState::Running;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::ProgramDescriptor;

    extern "C" fn noop(_env: *mut std::ffi::c_void, _proc: *mut Proc) {}

    fn blocked_proc(state: ProcState) -> Box<Proc> {
        let program = Box::new(ProgramDescriptor {
            init_code: noop,
            main_code: noop,
            fini_code: noop,
        });
        let mut proc = Proc::new(std::ptr::null_mut(), Box::into_raw(program));
        proc.state = state;
        proc
    }

    #[test]
    fn rendezvous_transfers_the_value_word() {
        let mut writer = blocked_proc(ProcState::BlockedWriting);
        let mut reader = blocked_proc(ProcState::BlockedReading);

        let mut target: u64 = 0;
        writer.upcall_args[1] = 0x2A;
        reader.upcall_args[0] = &mut target as *mut u64 as u64;

        assert!(rendezvous(&mut writer, &mut reader));
        assert_eq!(target, 0x2A);
        assert_eq!(writer.state, ProcState::Running);
        assert_eq!(reader.state, ProcState::Running);
    }

    #[test]
    fn rendezvous_fails_without_the_precondition() {
        let mut not_blocked = blocked_proc(ProcState::Running);
        let mut reader = blocked_proc(ProcState::BlockedReading);
        assert!(!rendezvous(&mut not_blocked, &mut reader));
        assert_eq!(reader.state, ProcState::BlockedReading);
    }
}
