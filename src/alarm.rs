/*!
 * Raw Alarm Bindings
 * Thin wrappers over alarm(2), sigaction, and the SIGALRM-blocked
 * critical section used around every registry mutation
 */

use log::debug;
use nix::libc;
use nix::sys::signal::{pthread_sigmask, sigaction, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};

use crate::core::errors::{TimeoutError, TimeoutResult};

/// Arm the process one-shot alarm; returns seconds remaining on the
/// previously scheduled alarm (0 if none)
#[inline]
pub(crate) fn arm(seconds: u32) -> u32 {
    unsafe { libc::alarm(seconds) }
}

/// Cancel any pending alarm
#[inline]
pub(crate) fn cancel() -> u32 {
    arm(0)
}

/// Monotonic clock in milliseconds
///
/// Uses clock_gettime directly rather than `Instant` so the signal handler
/// and normal code read the same async-signal-safe clock.
pub(crate) fn now_ms() -> u64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as u64) * 1_000 + (ts.tv_nsec as u64) / 1_000_000
}

/// Whole seconds to arm for a remaining span, rounding up
///
/// alarm(2) cannot express fractional seconds; truncating could fire early.
#[inline]
pub(crate) fn ceil_seconds(remaining_ms: u64) -> u32 {
    remaining_ms.div_ceil(1_000).min(u32::MAX as u64) as u32
}

/// Install `handler` as the SIGALRM disposition
///
/// SA_RESTART is deliberately left off: delivery must abort the blocked
/// syscall with EINTR, which is the entire interruption mechanism.
pub(crate) fn install(handler: extern "C" fn(libc::c_int)) -> TimeoutResult<()> {
    let action = SigAction::new(SigHandler::Handler(handler), SaFlags::empty(), SigSet::empty());
    unsafe { sigaction(Signal::SIGALRM, &action) }
        .map(|_| ())
        .map_err(|errno| TimeoutError::Setup(format!("sigaction(SIGALRM): {errno}")))
}

/// Install a no-op disposition
///
/// Used whenever the registry empties, so a stray late fire cannot hit the
/// default SIGALRM disposition (process termination).
pub(crate) fn install_noop() -> TimeoutResult<()> {
    install(noop_handler)
}

extern "C" fn noop_handler(_sig: libc::c_int) {}

/// Run `f` with SIGALRM blocked on the calling thread
///
/// Registry mutation plus alarm (re)arming must be atomic with respect to
/// the dispatcher firing mid-update; every mutating sequence goes through
/// here. The previous mask is restored even if `f` unwinds.
pub(crate) fn blocked<R>(f: impl FnOnce() -> R) -> R {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGALRM);
    let mut prev = SigSet::empty();
    if let Err(errno) = pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&mask), Some(&mut prev)) {
        debug!("failed to block SIGALRM, running unprotected: {errno}");
        return f();
    }
    let _restore = MaskRestore { prev };
    f()
}

struct MaskRestore {
    prev: SigSet,
}

impl Drop for MaskRestore {
    fn drop(&mut self) {
        if let Err(errno) = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.prev), None) {
            debug!("failed to restore signal mask: {errno}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_seconds_rounds_up() {
        assert_eq!(ceil_seconds(1), 1);
        assert_eq!(ceil_seconds(999), 1);
        assert_eq!(ceil_seconds(1_000), 1);
        assert_eq!(ceil_seconds(1_001), 2);
        assert_eq!(ceil_seconds(59_500), 60);
    }

    #[test]
    fn test_now_ms_monotonic() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_blocked_restores_mask_and_returns() {
        let value = blocked(|| 41 + 1);
        assert_eq!(value, 42);

        // nested sections restore the outer mask correctly
        let value = blocked(|| blocked(|| "inner"));
        assert_eq!(value, "inner");
    }
}
