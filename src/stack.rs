//! Heap-allocated stack segments.
//!
//! The xv6 kernel maps a fixed-size kernel stack per proc
//! (`Process::kernel_stack`, sized by `proc_mapstacks`) behind a guard page.
//! A hosted runtime has no page tables to juggle, so the segment is just a
//! boxed byte buffer — but it keeps xv6's sibling-linked shape so a
//! future segmented-stack implementation (growing a proc's stack by
//! chaining a new segment rather than reallocating) only has to fill in
//! `next`/`prev`, not restructure this type.

use crate::config::STACK_SEGMENT_SIZE;

/// A contiguous stack region, with room to link to sibling segments.
///
/// There is no live segment switching in the current runtime — `next` and
/// `prev` exist as a structural hook for future stack growth and are always
/// `None` today.
pub struct StackSegment {
    /// Usable byte size of this segment's body.
    size: usize,
    /// Bytes of `data` actually in use as stack (informational; the runtime
    /// doesn't enforce a high-water mark).
    live: usize,
    /// Opaque handle for an external memory checker (e.g. Valgrind stack
    /// registration). `None` on a normal build.
    checker_handle: Option<MemoryCheckerHandle>,
    next: Option<Box<StackSegment>>,
    data: Box<[u8]>,
}

/// Placeholder for whatever an external memory checker hands back on
/// registering a stack range. Never constructed outside the `valgrind`
/// feature; kept as a field so the layout doesn't change when that feature
/// is enabled.
#[derive(Copy, Clone)]
pub struct MemoryCheckerHandle(#[allow(dead_code)] u64);

impl StackSegment {
    /// Allocate one segment of [`STACK_SEGMENT_SIZE`] usable bytes, zeroed,
    /// and register its body range with the memory checker.
    pub fn new() -> StackSegment {
        let data = vec![0u8; STACK_SEGMENT_SIZE].into_boxed_slice();
        let checker_handle = register_with_memory_checker(data.as_ptr(), data.len());
        StackSegment {
            size: STACK_SEGMENT_SIZE,
            live: 0,
            checker_handle,
            next: None,
            data,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn live(&self) -> usize {
        self.live
    }

    /// Address one past the end of the stack body — the initial stack
    /// pointer before alignment, per §4.3.
    pub fn end(&mut self) -> *mut u8 {
        unsafe { self.data.as_mut_ptr().add(self.data.len()) }
    }

    pub fn start(&mut self) -> *mut u8 {
        self.data.as_mut_ptr()
    }
}

impl Drop for StackSegment {
    /// Walk the `next` chain, freeing each segment and deregistering it from
    /// the memory checker. `Box`'s own drop glue handles the actual
    /// deallocation; this just needs to unregister before that happens and
    /// make sure the whole chain runs (not just `self`).
    fn drop(&mut self) {
        if let Some(handle) = self.checker_handle.take() {
            deregister_with_memory_checker(handle);
        }
        // `self.next`, if any, drops here too, recursing down the chain.
    }
}

impl Default for StackSegment {
    fn default() -> Self {
        StackSegment::new()
    }
}

#[cfg(feature = "valgrind")]
fn register_with_memory_checker(base: *const u8, len: usize) -> Option<MemoryCheckerHandle> {
    // A real implementation would call into `crabgrind` or similar here.
    let _ = (base, len);
    None
}

#[cfg(not(feature = "valgrind"))]
fn register_with_memory_checker(_base: *const u8, _len: usize) -> Option<MemoryCheckerHandle> {
    None
}

fn deregister_with_memory_checker(_handle: MemoryCheckerHandle) {}
