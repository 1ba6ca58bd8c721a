/*!
 * Lock-Free Timeout Statistics
 * Atomic counters safe to bump from the signal handler and hot paths
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters for the timeout machinery
pub(crate) static STATS: AtomicTimeoutStats = AtomicTimeoutStats::new();

/// Atomic timeout statistics
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - Relaxed ordering throughout; individual values are accurate, mutual
///   consistency is not required for monitoring
#[repr(C, align(64))]
pub(crate) struct AtomicTimeoutStats {
    scopes_entered: AtomicU64,
    scopes_completed: AtomicU64,
    alarms_armed: AtomicU64,
    fires: AtomicU64,
    stale_fires: AtomicU64,
    expirations_raised: AtomicU64,
}

impl AtomicTimeoutStats {
    pub(crate) const fn new() -> Self {
        Self {
            scopes_entered: AtomicU64::new(0),
            scopes_completed: AtomicU64::new(0),
            alarms_armed: AtomicU64::new(0),
            fires: AtomicU64::new(0),
            stale_fires: AtomicU64::new(0),
            expirations_raised: AtomicU64::new(0),
        }
    }

    #[inline(always)]
    pub(crate) fn inc_scopes_entered(&self) {
        self.scopes_entered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn inc_scopes_completed(&self) {
        self.scopes_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn inc_alarms_armed(&self) {
        self.alarms_armed.fetch_add(1, Ordering::Relaxed);
    }

    /// Async-signal-safe: a bare atomic increment
    #[inline(always)]
    pub(crate) fn inc_fires(&self) {
        self.fires.fetch_add(1, Ordering::Relaxed);
    }

    /// Async-signal-safe: a bare atomic increment
    #[inline(always)]
    pub(crate) fn inc_stale_fires(&self) {
        self.stale_fires.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn inc_expirations_raised(&self) {
        self.expirations_raised.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of current stats (no locks required)
    pub(crate) fn snapshot(&self) -> TimeoutStats {
        TimeoutStats {
            scopes_entered: self.scopes_entered.load(Ordering::Relaxed),
            scopes_completed: self.scopes_completed.load(Ordering::Relaxed),
            alarms_armed: self.alarms_armed.load(Ordering::Relaxed),
            fires: self.fires.load(Ordering::Relaxed),
            stale_fires: self.stale_fires.load(Ordering::Relaxed),
            expirations_raised: self.expirations_raised.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutStats {
    /// Scopes entered with a positive duration
    pub scopes_entered: u64,
    /// Scopes that ran their cleanup (any exit path)
    pub scopes_completed: u64,
    /// Times the one-shot OS alarm was armed
    pub alarms_armed: u64,
    /// Alarm deliveries that found an expired deadline
    pub fires: u64,
    /// Alarm deliveries superseded by a rearm before they landed
    pub stale_fires: u64,
    /// Expired deadlines translated into raised errors
    pub expirations_raised: u64,
}
