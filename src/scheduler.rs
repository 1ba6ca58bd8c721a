/*!
 * Alarm Scheduler
 * Keeps exactly one OS alarm armed for the context's nearest deadline
 */

use log::{debug, trace};
use nix::libc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::alarm;
use crate::context::AlarmContext;
use crate::core::errors::{TimeoutError, TimeoutResult};
use crate::dispatcher;
use crate::stats::STATS;

/// Mirror value meaning "no alarm armed"
pub(crate) const DISARMED: u64 = u64::MAX;

/// Nearest deadline the armed alarm targets, monotonic milliseconds
///
/// Shared with the signal handler, which must not touch the registry: every
/// rearm re-establishes this mirror before control leaves the critical
/// section, so handler and registry state never observably diverge.
pub(crate) static EARLIEST_DEADLINE_MS: AtomicU64 = AtomicU64::new(DISARMED);

/// pthread of the context that armed the alarm
///
/// A process-directed SIGALRM may be delivered to any thread; the handler
/// re-routes deliveries that land elsewhere back to this thread so the
/// blocked syscall inside the guarded operation is the one aborted.
pub(crate) static TARGET_THREAD: AtomicUsize = AtomicUsize::new(0);

/// Re-establish the armed alarm from the context's registry
///
/// Must run inside the SIGALRM-blocked critical section. Exactly one of
/// three things happens:
/// - empty registry: cancel the alarm and install a no-op disposition so a
///   stray late fire cannot raise into unrelated code;
/// - nearest deadline already reached (clock jitter, or a re-entrant rearm
///   during dispatch): return the expiry synchronously instead of arming a
///   non-positive timer;
/// - otherwise: install the dispatcher and arm for the rounded-up remainder.
pub(crate) fn rearm(ctx: &AlarmContext) -> TimeoutResult<()> {
    let registry = ctx.registry().borrow();

    let Some(min) = registry.min_entry() else {
        drop(registry);
        alarm::cancel();
        alarm::install_noop()?;
        EARLIEST_DEADLINE_MS.store(DISARMED, Ordering::SeqCst);
        TARGET_THREAD.store(0, Ordering::SeqCst);
        trace!("registry empty, alarm disarmed");
        return Ok(());
    };

    let now = alarm::now_ms();
    if min.is_expired(now) {
        // synchronous dispatch: the error is raised here, the entry stays
        // registered until its own scope guard removes it
        let err = TimeoutError::Expired(min.to_expired(now));
        EARLIEST_DEADLINE_MS.store(min.deadline_ms(), Ordering::SeqCst);
        drop(registry);
        STATS.inc_expirations_raised();
        debug!("rearm found deadline already past, dispatching synchronously");
        return Err(err);
    }

    let remaining_ms = min.deadline_ms() - now;
    let deadline_ms = min.deadline_ms();
    drop(registry);

    alarm::install(dispatcher::on_alarm)?;
    TARGET_THREAD.store(unsafe { libc::pthread_self() } as usize, Ordering::SeqCst);
    EARLIEST_DEADLINE_MS.store(deadline_ms, Ordering::SeqCst);
    let seconds = alarm::ceil_seconds(remaining_ms);
    alarm::arm(seconds);
    STATS.inc_alarms_armed();
    trace!("alarm armed for {seconds}s ({remaining_ms}ms remaining)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ErrorSpec, TimeoutEntry};
    use std::time::Duration;

    #[test]
    fn test_disarmed_sentinel() {
        // the mirror must be able to express "no deadline" distinctly from
        // any reachable monotonic timestamp
        assert_eq!(DISARMED, u64::MAX);
        assert!(alarm::now_ms() < DISARMED);
    }

    #[test]
    fn test_rearm_publishes_min_deadline_and_disarms_when_empty() {
        AlarmContext::with(|ctx| {
            alarm::blocked(|| {
                let far = TimeoutEntry::new(Duration::from_secs(120), ErrorSpec::Default);
                let far_id = far.id();
                ctx.registry().borrow_mut().add(far);
                rearm(ctx).unwrap();
                assert_ne!(TARGET_THREAD.load(Ordering::SeqCst), 0);

                // a nearer entry must take over the mirror on the next rearm
                let near = TimeoutEntry::new(Duration::from_secs(60), ErrorSpec::Default);
                let near_id = near.id();
                let near_deadline = near.deadline_ms();
                ctx.registry().borrow_mut().add(near);
                rearm(ctx).unwrap();
                assert_eq!(EARLIEST_DEADLINE_MS.load(Ordering::SeqCst), near_deadline);

                // emptying the registry disarms the mirror and drops the
                // routing target
                ctx.registry().borrow_mut().remove(near_id);
                ctx.registry().borrow_mut().remove(far_id);
                rearm(ctx).unwrap();
                assert_eq!(EARLIEST_DEADLINE_MS.load(Ordering::SeqCst), DISARMED);
                assert_eq!(TARGET_THREAD.load(Ordering::SeqCst), 0);
            });
        });
    }
}
