/*!
 * Alarm Context
 * Explicit per-thread context owning one deadline registry
 */

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::time::Duration;

use crate::registry::DeadlineRegistry;

thread_local! {
    static CONTEXT: AlarmContext = AlarmContext::new();
}

/// Per-thread execution context for the timeout machinery
///
/// Each context owns an independent registry; entries are only ever added or
/// removed by code running on the owning thread, inside the SIGALRM-blocked
/// critical section. Lazily created on first use, torn down at thread exit.
pub struct AlarmContext {
    registry: RefCell<DeadlineRegistry>,
}

impl AlarmContext {
    fn new() -> Self {
        Self {
            registry: RefCell::new(DeadlineRegistry::new()),
        }
    }

    /// Run `f` against the calling thread's context
    pub(crate) fn with<R>(f: impl FnOnce(&AlarmContext) -> R) -> R {
        CONTEXT.with(f)
    }

    pub(crate) fn registry(&self) -> &RefCell<DeadlineRegistry> {
        &self.registry
    }

    /// Read-only view of this context's pending entries
    pub(crate) fn snapshot(&self) -> PendingSnapshot {
        let registry = self.registry.borrow();
        PendingSnapshot {
            count: registry.len(),
            remaining: registry.remaining_deadlines(),
        }
    }
}

/// Read-only view of one context's pending deadlines, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSnapshot {
    /// Number of active entries
    pub count: usize,
    /// Remaining time per entry, registration order, zero if already past
    pub remaining: Vec<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_starts_empty() {
        AlarmContext::with(|ctx| {
            let snapshot = ctx.snapshot();
            assert_eq!(snapshot.count, 0);
            assert!(snapshot.remaining.is_empty());
        });
    }

    #[test]
    fn test_contexts_are_thread_independent() {
        use crate::core::types::{ErrorSpec, TimeoutEntry};

        AlarmContext::with(|ctx| {
            ctx.registry()
                .borrow_mut()
                .add(TimeoutEntry::new(Duration::from_secs(60), ErrorSpec::Default));
        });

        // a fresh thread sees its own empty registry
        let other = std::thread::spawn(|| AlarmContext::with(|ctx| ctx.snapshot().count))
            .join()
            .unwrap();
        assert_eq!(other, 0);

        AlarmContext::with(|ctx| {
            assert_eq!(ctx.snapshot().count, 1);
            let registry = ctx.registry();
            let id = registry.borrow().min_entry().unwrap().id();
            registry.borrow_mut().remove(id);
        });
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = PendingSnapshot {
            count: 1,
            remaining: vec![Duration::from_secs(3)],
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"count\":1"));
        let back: PendingSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
