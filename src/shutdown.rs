//! Cooperative shutdown
//!
//! Signal handlers only raise a flag. Long-running loops poll [`requested`]
//! and return, and the owner of the driver calls `shutdown` from normal
//! context.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

static REQUESTED: AtomicBool = AtomicBool::new(false);

/// Ask running loops to stop
pub fn request() {
    REQUESTED.store(true, Ordering::SeqCst);
}

pub fn requested() -> bool {
    REQUESTED.load(Ordering::SeqCst)
}

extern "C" fn on_signal(_signum: libc::c_int) {
    // Only async-signal-safe work here
    REQUESTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT, SIGTERM and SIGHUP to [`request`]
pub fn install_signal_handlers() -> io::Result<()> {
    for signum in [libc::SIGINT, libc::SIGTERM, libc::SIGHUP] {
        // SAFETY: the handler only touches an atomic.
        let previous = unsafe { libc::signal(signum, on_signal as *const () as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
