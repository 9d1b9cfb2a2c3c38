//! Cheap, polling-based termination signal handling (lock-free).
//!
//! The handler only stores the signal number; the scheduler polls it between
//! cycles, so an in-flight cycle is never interrupted.

#[cfg(unix)]
mod imp {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

    static RECEIVED_SIGNAL: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn handler(sig: i32) {
        RECEIVED_SIGNAL.store(sig as usize, Ordering::SeqCst);
    }

    pub fn install() -> anyhow::Result<()> {
        let action = SigAction::new(
            SigHandler::Handler(handler),
            SaFlags::empty(),
            SigSet::empty(),
        );
        for sig in [Signal::SIGINT, Signal::SIGTERM] {
            unsafe { signal::sigaction(sig, &action) }.map_err(|e| {
                anyhow::anyhow!("Failed to register {sig} handler: {e}. Signal handling is required for daemon operation.")
            })?;
        }
        Ok(())
    }

    /// Non-blocking check - returns Some(signal name) once per delivery.
    pub fn check() -> Option<&'static str> {
        let val = RECEIVED_SIGNAL.swap(0, Ordering::AcqRel);
        if val == 0 {
            return None;
        }
        match Signal::try_from(val as i32) {
            Ok(sig) => Some(sig.as_str()),
            Err(e) => {
                log::error!("Invalid signal number {val} from signal handler: {e}");
                None
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    pub fn install() -> anyhow::Result<()> {
        Ok(())
    }

    pub fn check() -> Option<&'static str> {
        None
    }
}

pub use imp::{check, install};
