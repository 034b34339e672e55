//! Ctrl-C handling: the first SIGINT asks the run to stop between actions,
//! a second one terminates the process.

use declarative::CancelToken;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static INTERRUPTED: OnceLock<Arc<AtomicBool>> = OnceLock::new();

#[allow(unsafe_code)]
extern "C" fn on_sigint(_signum: libc::c_int) {
    if let Some(flag) = INTERRUPTED.get() {
        flag.store(true, Ordering::SeqCst);
    }
    // SAFETY: signal() is async-signal-safe; restoring the default makes a
    // second Ctrl-C kill the process.
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
    }
}

/// Install the SIGINT handler and return a token tied to it
#[allow(unsafe_code)]
pub fn cancel_on_interrupt() -> CancelToken {
    let flag = INTERRUPTED.get_or_init(|| Arc::new(AtomicBool::new(false)));

    // SAFETY: the handler only touches an atomic and calls signal().
    let previous = unsafe { libc::signal(libc::SIGINT, on_sigint as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        log::warn!("could not install SIGINT handler; Ctrl-C will abort immediately");
    }

    CancelToken::from_flag(Arc::clone(flag))
}

