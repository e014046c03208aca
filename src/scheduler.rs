//! Picking the next runnable proc (§4.6).
//!
//! The xv6 kernel's `scheduler()` loop scans the proc table looking for
//! the next `Runnable` entry and falls into a hardware `wfi` when none are
//! found. This runtime has no hardware to wait on — with nothing runnable
//! it either deadlocks (if something is blocked) or is simply done — so the
//! selection itself is the whole of the scheduler: draw uniformly at random
//! from the runnable pool.

use rand::rngs::StdRng;
use rand::Rng;

/// Draw a uniformly random index in `0..len`.
///
/// # Panics
/// Panics if `len` is zero; callers must check the pool is non-empty first
/// (an empty runnable pool is a deadlock, not a scheduler decision).
pub fn pick_index(rng: &mut StdRng, len: usize) -> usize {
    assert!(len > 0, "pick_index called on an empty pool");
    rng.gen_range(0..len)
}
