//! Cooperative cancellation for worker runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPT_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Shared flag a driver polls while its worker runs.
///
/// Clones observe the same flag. A token created with [`CancelToken::on_interrupt`]
/// also trips when the operator presses Ctrl-C.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    follows_interrupt: bool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is also cancelled by SIGINT once [`install_interrupt_handler`] ran.
    pub fn on_interrupt() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            follows_interrupt: true,
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || (self.follows_interrupt && interrupt_requested())
    }
}

/// Whether SIGINT arrived since the handler was installed.
pub fn interrupt_requested() -> bool {
    INTERRUPT_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(unix)]
extern "C" fn on_sigint(_: nix::libc::c_int) {
    INTERRUPT_REQUESTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT to a flag instead of terminating the process.
///
/// Workers run in their own process group, so Ctrl-C reaches only the
/// orchestrator; in-flight drivers then terminate their workers and report.
#[cfg(unix)]
pub fn install_interrupt_handler() {
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

    let action = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
    if let Err(e) = unsafe { sigaction(Signal::SIGINT, &action) } {
        tracing::warn!(error = %e, "failed to install SIGINT handler");
    }
}

#[cfg(not(unix))]
pub fn install_interrupt_handler() {}
