/*!
 * Scope Guard
 * Public run-with-timeout entry points with guaranteed cleanup
 *
 * The alarm slot is treated like any other scoped resource: registration
 * and arming happen on entry, removal and rearming happen on every exit
 * path, including panic unwind and expiry-driven unwind.
 */

use log::debug;
use std::time::Duration;

use crate::alarm;
use crate::context::{AlarmContext, PendingSnapshot};
use crate::core::errors::{TimeoutError, TimeoutResult};
use crate::core::types::{ErrorSpec, TimeoutEntry, TimeoutId};
use crate::dispatcher;
use crate::scheduler;
use crate::stats::{TimeoutStats, STATS};

/// Run `op` under a deadline, interrupting it once the deadline passes
///
/// - `Duration::ZERO` disables the mechanism: `op` runs with no deadline.
/// - Otherwise a fresh entry is registered for `now + duration`, the alarm
///   is rearmed for the context's nearest deadline, and `op` runs. A
///   blocking syscall inside `op` is aborted by the SIGALRM delivery; the
///   expiry surfaces as [`TimeoutError::Expired`] once control returns.
/// - `spec` selects the raised error kind; `None` means the library default,
///   which converts to `std::io::ErrorKind::TimedOut`.
///
/// Scopes nest: the nearest deadline always owns the single alarm slot. If
/// an inner and an outer scope expire at effectively the same instant, only
/// the earliest entry's error fires; after catching it, call
/// [`check_pending`] to re-raise an outer deadline that elapsed meanwhile.
/// This is a structural consequence of the one-alarm-slot design, not
/// something this library papers over with extra timers.
pub fn run_with_timeout<T, F>(duration: Duration, spec: Option<ErrorSpec>, op: F) -> TimeoutResult<T>
where
    F: FnOnce() -> T,
{
    if duration.is_zero() {
        return Ok(op());
    }

    AlarmContext::with(|ctx| {
        let entry = TimeoutEntry::new(duration, spec.unwrap_or_default());
        let id = entry.id();
        STATS.inc_scopes_entered();

        // register + arm atomically; a competing deadline that is already
        // past raises here, before the operation ever runs
        if let Err(err) = alarm::blocked(|| {
            ctx.registry().borrow_mut().add(entry);
            scheduler::rearm(ctx)
        }) {
            withdraw(ctx, id);
            return Err(err);
        }

        let mut cleanup = ScopeCleanup {
            ctx,
            id,
            armed: true,
        };
        let output = op();
        cleanup.armed = false;

        // translate any expiry observed during the operation, then release
        // the alarm slot; the rearm runs even when an expiry is raised
        let released = alarm::blocked(|| {
            let check = dispatcher::raise_if_expired(ctx);
            ctx.registry().borrow_mut().remove(id);
            check.and(scheduler::rearm(ctx))
        });
        STATS.inc_scopes_completed();
        released.map(|()| output)
    })
}

/// Remove a scope's entry and rearm, demoting any synchronous expiry
///
/// Used on paths that already carry an error: the competing expired entry
/// stays registered, and its own scope guard raises it.
fn withdraw(ctx: &AlarmContext, id: TimeoutId) {
    alarm::blocked(|| {
        ctx.registry().borrow_mut().remove(id);
        if let Err(err) = scheduler::rearm(ctx) {
            debug!("expired deadline left pending during withdrawal: {err}");
        }
    });
    STATS.inc_scopes_completed();
}

/// Cleanup net for panic unwind out of the guarded operation
struct ScopeCleanup<'a> {
    ctx: &'a AlarmContext,
    id: TimeoutId,
    armed: bool,
}

impl Drop for ScopeCleanup<'_> {
    fn drop(&mut self) {
        if self.armed {
            withdraw(self.ctx, self.id);
        }
    }
}

/// Re-evaluate the nearest pending deadline for the calling context
///
/// Raises the deadline again if it has already expired, otherwise rearms
/// the alarm for it. This is the manual recheck used after catching an
/// inner scope's expiry when an outer deadline may have elapsed during the
/// same instant (see [`run_with_timeout`]).
pub fn check_pending() -> TimeoutResult<()> {
    AlarmContext::with(|ctx| {
        alarm::blocked(|| {
            // every mutation rearms synchronously, so an empty registry
            // already means a disarmed alarm; nothing to re-evaluate
            if ctx.registry().borrow().is_empty() {
                return Ok(());
            }
            dispatcher::raise_if_expired(ctx)?;
            scheduler::rearm(ctx)
        })
    })
}

/// Reusable applier capturing a duration and an error spec
///
/// Produced by [`prepare`]; each [`run`](Self::run) behaves exactly like the
/// equivalent [`run_with_timeout`] call, with no state carried between uses.
#[derive(Debug, Clone)]
pub struct PreparedTimeout {
    duration: Duration,
    spec: ErrorSpec,
}

impl PreparedTimeout {
    /// Run `op` under this applier's deadline
    pub fn run<T, F>(&self, op: F) -> TimeoutResult<T>
    where
        F: FnOnce() -> T,
    {
        run_with_timeout(self.duration, Some(self.spec.clone()), op)
    }

    /// Dynamic form for embedders holding an optional boxed operation
    ///
    /// Applying without an operation is a usage error, raised synchronously.
    pub fn run_boxed<T>(&self, op: Option<Box<dyn FnOnce() -> T + '_>>) -> TimeoutResult<T> {
        match op {
            Some(op) => self.run(op),
            None => Err(TimeoutError::StalePrepared),
        }
    }

    /// Configured duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Configured error spec
    pub fn error_spec(&self) -> &ErrorSpec {
        &self.spec
    }
}

/// Build a reusable timeout applier
///
/// A positive duration is required here; zero means "no deadline" and has
/// no meaningful prepared form.
pub fn prepare(duration: Duration, spec: Option<ErrorSpec>) -> TimeoutResult<PreparedTimeout> {
    if duration.is_zero() {
        return Err(TimeoutError::InvalidDuration(duration));
    }
    Ok(PreparedTimeout {
        duration,
        spec: spec.unwrap_or_default(),
    })
}

/// Number of pending entries in the calling context's registry
pub fn pending_count() -> usize {
    AlarmContext::with(|ctx| alarm::blocked(|| ctx.snapshot().count))
}

/// Remaining time per pending entry, registration order
pub fn pending_deadlines() -> Vec<Duration> {
    AlarmContext::with(|ctx| alarm::blocked(|| ctx.snapshot().remaining))
}

/// Full read-only view of the calling context's pending entries
pub fn pending_snapshot() -> PendingSnapshot {
    AlarmContext::with(|ctx| alarm::blocked(|| ctx.snapshot()))
}

/// Process-wide statistics snapshot
pub fn stats() -> TimeoutStats {
    STATS.snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;

    // tests here stay off the real alarm; everything that arms SIGALRM
    // lives in tests/timeout_test.rs under serial_test

    #[test]
    fn test_zero_duration_disables() {
        let value = run_with_timeout(Duration::ZERO, None, || 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_prepare_rejects_zero() {
        match prepare(Duration::ZERO, None) {
            Err(TimeoutError::InvalidDuration(d)) => assert_eq!(d, Duration::ZERO),
            other => panic!("expected InvalidDuration, got {other:?}"),
        }
    }

    #[test]
    fn test_prepared_accessors() {
        let prepared = prepare(Duration::from_secs(3), Some(ErrorSpec::from("slow"))).unwrap();
        assert_eq!(prepared.duration(), Duration::from_secs(3));
        assert_eq!(prepared.error_spec().message(), "slow");
    }

    #[test]
    fn test_run_boxed_without_operation_is_stale() {
        let prepared = prepare(Duration::from_secs(1), None).unwrap();
        let result: TimeoutResult<i32> = prepared.run_boxed(None);
        assert!(matches!(result, Err(TimeoutError::StalePrepared)));
    }
}
