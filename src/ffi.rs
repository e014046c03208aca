//! The embedder-facing entry point (§6, "Embedder entry point").
//!
//! The xv6 kernel's FFI surface is a set of bare `#[no_mangle] pub
//! unsafe extern "C" fn`s (`allocproc`, `myproc`, ...) called directly from
//! assembly and C. This runtime has exactly one such entry point — start
//! the whole program — so it gets one function, `procrt_run`, instead of a
//! family.

use crate::glue::ForeignGlue;
use crate::proc::{Proc, ProgramDescriptor};
use crate::runtime::run_program;

/// Run `program` to completion using the real (assembly-backed) context
/// switch, and return its exit code.
///
/// `c_to_proc` is the embedder-supplied glue function that performs the
/// actual switch into a proc (§6, "Embedder entry point" names this as a
/// mandatory second parameter alongside the program descriptor); nothing
/// in this crate hardcodes it.
///
/// Mirrors `run_program`'s `Result` at the Rust API boundary by collapsing
/// it to the documented exit codes (§7) here, at the FFI boundary, since a
/// C caller has no `Result` to inspect.
///
/// # Safety
/// `program` must point to a live, fully-initialized [`ProgramDescriptor`]
/// for the duration of the call, and `c_to_proc` must be a valid switch
/// routine satisfying §4.4's calling convention.
#[no_mangle]
pub unsafe extern "C" fn procrt_run(
    program: *const ProgramDescriptor,
    c_to_proc: unsafe extern "C" fn(*mut Proc),
) -> i32 {
    crate::diagnostics::install_line_logger();
    let mut glue = ForeignGlue::new(c_to_proc);
    match run_program(program, &mut glue, None) {
        Ok(code) => code,
        Err(err) => err.exit_code(),
    }
}
