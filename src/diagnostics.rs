//! Diagnostic output.
//!
//! The historical runtime this crate models writes human-readable lines to
//! standard output, each prefixed `rt:` (§6: "Not a compatibility surface").
//! Rather than hardcode that behavior the way the xv6 kernel's
//! `printf!`/`uprintln!` macros write straight to a UART, diagnostics here go
//! through the `log` facade under the `rt` target — the embedder chooses
//! (or omits) a logger, the same way it chooses whether to link a real UART
//! driver or a mock one.
//!
//! [`install_line_logger`] provides the "I just want the old behavior"
//! default: every record is written to stdout as `rt: <message>`.

use std::io::Write;
use std::sync::Once;

pub(crate) const TARGET: &str = "rt";

/// Emit a diagnostic line at `info` level under the `rt` target.
macro_rules! rt_info {
    ($($arg:tt)*) => {
        log::info!(target: $crate::diagnostics::TARGET, $($arg)*)
    };
}
pub(crate) use rt_info;

/// Emit a diagnostic line at `error` level under the `rt` target.
macro_rules! rt_error {
    ($($arg:tt)*) => {
        log::error!(target: $crate::diagnostics::TARGET, $($arg)*)
    };
}
pub(crate) use rt_error;

/// A minimal [`log::Log`] implementation that writes `rt:`-prefixed lines to
/// standard output, matching the historical console behavior described in §6.
///
/// Only records under the `rt` target are printed; everything else is
/// dropped. Embedders that want structured logging instead should install
/// their own logger (e.g. `env_logger`) before calling [`crate::run_program`]
/// and skip this one entirely.
struct LineLogger;

impl log::Log for LineLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.target() == TARGET
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let mut stdout = std::io::stdout();
            let _ = writeln!(stdout, "rt: {}", record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

static INSTALL: Once = Once::new();

/// Install the default `rt:`-prefixed line logger, if no logger has been
/// installed yet.
///
/// Safe to call more than once; only the first call has an effect.
pub fn install_line_logger() {
    INSTALL.call_once(|| {
        let _ = log::set_boxed_logger(Box::new(LineLogger))
            .map(|()| log::set_max_level(log::LevelFilter::Info));
    });
}
