/*!
 * Timeout Types
 * Entry tokens, deadline entries, and polymorphic error-kind descriptors
 */

use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::alarm;

/// Boxed error produced by a custom [`ErrorSpec::Factory`]
pub type BoxedError = Box<dyn Error + Send + Sync>;

/// Unique token identifying one timeout scope
///
/// Random 122-bit tokens make collision within a context's lifetime
/// negligible, so entries can be removed by id without generation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeoutId(Uuid);

impl TimeoutId {
    /// Generate a fresh token
    #[inline]
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TimeoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error-kind descriptor supplied at scope configuration time
///
/// The error value itself is only built when a deadline actually expires;
/// the descriptor is what the registry stores, so it must stay cheap to clone.
#[derive(Clone, Default)]
pub enum ErrorSpec {
    /// The library's own timeout kind ("execution expired"), interoperable
    /// with `std::io::ErrorKind::TimedOut` via the `io::Error` conversion
    #[default]
    Default,

    /// Default kind with a caller-supplied message
    Message(String),

    /// Factory producing a custom source error from the expiry payload
    Factory(Arc<dyn Fn(&ExpiredTimeout) -> BoxedError + Send + Sync>),
}

impl fmt::Debug for ErrorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "ErrorSpec::Default"),
            Self::Message(msg) => write!(f, "ErrorSpec::Message({msg:?})"),
            Self::Factory(_) => write!(f, "ErrorSpec::Factory(..)"),
        }
    }
}

impl ErrorSpec {
    /// Message carried by errors raised for this spec
    pub fn message(&self) -> &str {
        match self {
            Self::Message(msg) => msg,
            Self::Default | Self::Factory(_) => "execution expired",
        }
    }
}

impl From<&str> for ErrorSpec {
    fn from(msg: &str) -> Self {
        Self::Message(msg.to_string())
    }
}

impl From<String> for ErrorSpec {
    fn from(msg: String) -> Self {
        Self::Message(msg)
    }
}

/// One active timeout scope in a context's registry
///
/// Owned exclusively by the registry of the context that created it: entries
/// are added on scope entry and removed only by their own scope guard on exit
/// (normal, error, or expiry unwind). The dispatcher never removes entries,
/// so a manual recheck after catching an expiry still reads as expired.
#[derive(Debug, Clone)]
pub(crate) struct TimeoutEntry {
    id: TimeoutId,
    deadline_ms: u64,
    requested: Duration,
    origin: Arc<Backtrace>,
    spec: ErrorSpec,
    seq: u64,
}

impl TimeoutEntry {
    /// Create an entry expiring `duration` from now, capturing the origin
    /// call stack of the scope that requested it
    pub(crate) fn new(duration: Duration, spec: ErrorSpec) -> Self {
        Self {
            id: TimeoutId::generate(),
            deadline_ms: alarm::now_ms()
                .saturating_add(duration.as_millis().min(u64::MAX as u128) as u64),
            requested: duration,
            origin: Arc::new(Backtrace::capture()),
            spec,
            seq: 0,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> TimeoutId {
        self.id
    }

    /// Absolute deadline, monotonic milliseconds
    #[inline]
    pub(crate) fn deadline_ms(&self) -> u64 {
        self.deadline_ms
    }

    /// Registry insertion order, used to break deadline ties deterministically
    #[inline]
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    /// Whether the deadline has been reached
    #[inline]
    pub(crate) fn is_expired(&self, now_ms: u64) -> bool {
        self.deadline_ms <= now_ms
    }

    /// Remaining time before the deadline, zero if already past
    pub(crate) fn remaining(&self, now_ms: u64) -> Duration {
        Duration::from_millis(self.deadline_ms.saturating_sub(now_ms))
    }

    /// Build the expiry payload for this entry
    ///
    /// Does not consume the entry: the registry keeps it until the owning
    /// scope guard removes it on unwind.
    pub(crate) fn to_expired(&self, now_ms: u64) -> ExpiredTimeout {
        let mut payload = ExpiredTimeout {
            id: self.id,
            message: self.spec.message().to_string(),
            requested: self.requested,
            late_by: Duration::from_millis(now_ms.saturating_sub(self.deadline_ms)),
            origin: Arc::clone(&self.origin),
            source: None,
        };
        if let ErrorSpec::Factory(factory) = &self.spec {
            payload.source = Some(factory(&payload));
        }
        payload
    }
}

/// Payload of an expired timeout, carried by [`TimeoutError::Expired`]
///
/// [`TimeoutError::Expired`]: crate::TimeoutError::Expired
#[derive(Debug)]
pub struct ExpiredTimeout {
    id: TimeoutId,
    message: String,
    requested: Duration,
    late_by: Duration,
    origin: Arc<Backtrace>,
    source: Option<BoxedError>,
}

impl ExpiredTimeout {
    /// Token of the scope that expired
    pub fn id(&self) -> TimeoutId {
        self.id
    }

    /// Configured duration of the expired scope
    pub fn requested(&self) -> Duration {
        self.requested
    }

    /// How far past the deadline the expiry was observed
    pub fn late_by(&self) -> Duration {
        self.late_by
    }

    /// Call stack captured when the expired scope was entered
    ///
    /// Capture honors `RUST_BACKTRACE`; without it the trace is disabled.
    pub fn origin(&self) -> &Backtrace {
        &self.origin
    }

    /// Custom source error produced by an [`ErrorSpec::Factory`], if any
    pub fn custom_source(&self) -> Option<&BoxedError> {
        self.source.as_ref()
    }
}

impl fmt::Display for ExpiredTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (timeout {:?}, observed {:?} past deadline)",
            self.message, self.requested, self.late_by
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_uniqueness() {
        let a = TimeoutId::generate();
        let b = TimeoutId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_error_spec_messages() {
        assert_eq!(ErrorSpec::Default.message(), "execution expired");
        assert_eq!(ErrorSpec::from("db query too slow").message(), "db query too slow");
        let factory = ErrorSpec::Factory(Arc::new(|_| "boom".into()));
        assert_eq!(factory.message(), "execution expired");
    }

    #[test]
    fn test_entry_deadline_arithmetic() {
        let entry = TimeoutEntry::new(Duration::from_secs(5), ErrorSpec::Default);
        let now = alarm::now_ms();
        assert!(!entry.is_expired(now));
        assert!(entry.is_expired(now + 5_001));
        assert!(entry.remaining(now) <= Duration::from_secs(5));
        assert_eq!(entry.remaining(entry.deadline_ms() + 100), Duration::ZERO);
    }

    #[test]
    fn test_expired_payload_from_factory() {
        let spec = ErrorSpec::Factory(Arc::new(|info| {
            format!("query aborted after {:?}", info.requested()).into()
        }));
        let entry = TimeoutEntry::new(Duration::from_secs(2), spec);
        let payload = entry.to_expired(entry.deadline_ms() + 250);
        assert_eq!(payload.late_by(), Duration::from_millis(250));
        let source = payload.custom_source().expect("factory source");
        assert!(source.to_string().contains("query aborted"));
    }

    #[test]
    fn test_expired_display() {
        let entry = TimeoutEntry::new(Duration::from_secs(1), ErrorSpec::from("too slow"));
        let payload = entry.to_expired(entry.deadline_ms());
        let rendered = payload.to_string();
        assert!(rendered.starts_with("too slow"));
        assert!(rendered.contains("timeout 1s"));
    }
}
