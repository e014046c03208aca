//! Heap allocation backing the `malloc`/`free` upcalls (§4.7, codes 4–5).
//!
//! The xv6 kernel's `kalloc.rs` hands out whole physical pages from a
//! freelist threaded through the pages themselves. A hosted runtime has no
//! pages to manage — it just forwards to the process heap — but it still
//! needs to recover an allocation's size at `free` time without the caller
//! supplying it back, so each allocation is prefixed with a small header
//! recording its total size, the same trick xv6's physical-page allocator avoids
//! only because physical pages are a single fixed size.

use std::alloc::{alloc, dealloc, Layout};
use std::mem::{align_of, size_of};

const HEADER_SIZE: usize = size_of::<usize>();

/// Allocate `count` usable bytes, returning the address generated code
/// should use. Returns `None` on allocation failure (§7: fatal, exit 123).
pub fn rt_malloc(count: usize) -> Option<*mut u8> {
    let align = align_of::<usize>();
    let total = count.checked_add(HEADER_SIZE)?;
    let layout = Layout::from_size_align(total, align).ok()?;
    unsafe {
        let raw = alloc(layout);
        if raw.is_null() {
            return None;
        }
        (raw as *mut usize).write(total);
        Some(raw.add(HEADER_SIZE))
    }
}

/// Free a pointer previously returned by [`rt_malloc`].
///
/// # Safety
/// `ptr` must be a still-live pointer returned by `rt_malloc`, not yet freed.
pub unsafe fn rt_free(ptr: *mut u8) {
    let raw = ptr.sub(HEADER_SIZE);
    let total = (raw as *mut usize).read();
    let layout = Layout::from_size_align(total, align_of::<usize>()).expect("corrupt allocation header");
    dealloc(raw, layout);
}
