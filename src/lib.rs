//! Cooperative user-space process runtime.
//!
//! Schedules lightweight "procs" onto a single host thread, switching
//! between them with a small set of context-switch primitives and a
//! register-based upcall protocol, and provides CSP-style rendezvous
//! between a port's owner and the channels queued to send to it.

pub mod alloc;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod ffi;
pub mod glue;
pub mod pointer_vec;
pub mod proc;
pub mod rendezvous;
pub mod runtime;
pub mod scheduler;
pub mod stack;
pub mod upcall;

pub use error::{Result, RuntimeError};
pub use glue::{ForeignGlue, MockGlue, ProcGlue};
pub use proc::{Proc, ProcState, ProgramDescriptor};
pub use rendezvous::{rendezvous, Channel, Port};
pub use runtime::{run_program, Runtime};
