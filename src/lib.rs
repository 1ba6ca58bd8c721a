/*!
 * timeout-interrupt
 * Deadline interruption of blocking operations via a one-shot SIGALRM
 *
 * Unlike cooperative deadline checks, this interrupts an operation even
 * while it is blocked inside a syscall: signal delivery aborts the syscall
 * with EINTR, and the expired deadline surfaces as an error the moment
 * control returns to the scope guard. One alarm slot per execution context
 * is kept armed for the nearest of the possibly nested, possibly
 * overlapping deadlines.
 *
 * ```no_run
 * use std::time::Duration;
 * use timeout_interrupt::{run_with_timeout, TimeoutError};
 *
 * let result = run_with_timeout(Duration::from_secs(1), None, || {
 *     // blocks for 5s, aborted after ~1s by the alarm delivery
 *     unsafe { nix::libc::sleep(5) }
 * });
 * assert!(matches!(result, Err(TimeoutError::Expired(_))));
 * ```
 *
 * Pure CPU-bound loops with no blocking syscall are not preempted, and each
 * thread's deadlines are independent; see the module docs for the
 * single-alarm-slot limitation around simultaneously expiring nested scopes.
 */

mod alarm;
mod context;
pub mod core;
mod dispatcher;
mod guard;
mod registry;
mod scheduler;
mod stats;

// Re-export public API
pub use crate::core::errors::{TimeoutError, TimeoutResult};
pub use crate::core::types::{BoxedError, ErrorSpec, ExpiredTimeout, TimeoutId};
pub use context::{AlarmContext, PendingSnapshot};
pub use guard::{
    check_pending, pending_count, pending_deadlines, pending_snapshot, prepare, run_with_timeout,
    stats, PreparedTimeout,
};
pub use crate::stats::TimeoutStats;
