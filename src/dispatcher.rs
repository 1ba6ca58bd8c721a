/*!
 * Interrupt Dispatcher
 * SIGALRM handler plus the expiry-to-error translation run by normal code
 *
 * Raising out of a signal handler is not expressible in Rust, so dispatch is
 * split in two: the handler performs only async-signal-safe work (atomic
 * loads, clock_gettime, alarm, pthread_kill) and relies on the delivery
 * itself aborting the blocked syscall with EINTR; the scope guard and
 * `check_pending` then translate the expired registry entry into a
 * `TimeoutError::Expired` at the point control re-enters normal code.
 */

use log::debug;
use nix::libc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::alarm;
use crate::context::AlarmContext;
use crate::core::errors::{TimeoutError, TimeoutResult};
use crate::scheduler::{DISARMED, EARLIEST_DEADLINE_MS, TARGET_THREAD};
use crate::stats::STATS;

/// Hint that an armed alarm has fired for a reached deadline
///
/// Purely advisory: the truth is always the registry's deadlines, so an
/// expiry can never be lost to a missed flag.
pub(crate) static FIRED: AtomicBool = AtomicBool::new(false);

/// SIGALRM handler
///
/// Everything here must stay async-signal-safe: no allocation, no locks,
/// no logging, no registry access.
pub(crate) extern "C" fn on_alarm(_sig: libc::c_int) {
    // re-route deliveries that landed on a foreign thread, so the EINTR
    // hits the syscall blocked inside the guarded operation
    let target = TARGET_THREAD.load(Ordering::SeqCst);
    let me = unsafe { libc::pthread_self() } as usize;
    if target != 0 && target != me {
        unsafe {
            libc::pthread_kill(target as libc::pthread_t, libc::SIGALRM);
        }
        return;
    }

    let deadline = EARLIEST_DEADLINE_MS.load(Ordering::SeqCst);
    if deadline == DISARMED {
        // stray late fire after the registry emptied
        return;
    }

    let now = alarm::now_ms();
    if now < deadline {
        // stale fire: a rearm superseded the deadline this alarm was armed
        // for; arm for the current remainder and do not flag
        STATS.inc_stale_fires();
        alarm::arm(alarm::ceil_seconds(deadline - now));
        return;
    }

    FIRED.store(true, Ordering::SeqCst);
    STATS.inc_fires();
}

/// Translate the nearest expired deadline into an error
///
/// Must run inside the SIGALRM-blocked critical section. Deliberately does
/// not remove the expired entry: removal is the owning scope guard's job on
/// unwind, so a manual recheck after catching the error still reads the
/// deadline as expired and raises again.
pub(crate) fn raise_if_expired(ctx: &AlarmContext) -> TimeoutResult<()> {
    let registry = ctx.registry().borrow();

    let Some(min) = registry.min_entry() else {
        FIRED.store(false, Ordering::SeqCst);
        return Ok(());
    };

    let now = alarm::now_ms();
    if min.is_expired(now) {
        let err = TimeoutError::Expired(min.to_expired(now));
        drop(registry);
        // the hint only tells apart alarm-driven and synchronously detected
        // expiries; the deadline comparison above is the source of truth
        let fired = FIRED.swap(false, Ordering::SeqCst);
        STATS.inc_expirations_raised();
        debug!("raising expired deadline into interrupted scope (alarm fired: {fired})");
        return Err(err);
    }

    Ok(())
}
