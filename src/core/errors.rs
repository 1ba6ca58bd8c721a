/*!
 * Error Types
 * Timeout error taxonomy with thiserror and io::Error interop
 */

use std::io;
use std::time::Duration;
use thiserror::Error;

use super::types::ExpiredTimeout;

/// Timeout operation result
pub type TimeoutResult<T> = Result<T, TimeoutError>;

/// Timeout errors
#[derive(Error, Debug)]
pub enum TimeoutError {
    /// A positive duration was required; synchronous, never deferred
    #[error("invalid timeout duration {0:?}: a positive duration is required")]
    InvalidDuration(Duration),

    /// A deadline expired; raised asynchronously out of the interrupted scope
    #[error("{0}")]
    Expired(ExpiredTimeout),

    /// A prepared applier was invoked without an operation
    #[error("prepared timeout applied without an operation")]
    StalePrepared,

    /// Installing the SIGALRM handler or mask failed; environment problem,
    /// surfaced once at arming time, never raised asynchronously
    #[error("signal setup failed: {0}")]
    Setup(String),
}

impl TimeoutError {
    /// Whether this is an expired deadline
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired(_))
    }

    /// Expiry payload, if this is an expired deadline
    pub fn expired(&self) -> Option<&ExpiredTimeout> {
        match self {
            Self::Expired(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Compatibility with the ecosystem's generic timeout kind: existing
/// `e.kind() == ErrorKind::TimedOut` handlers keep working unmodified.
impl From<TimeoutError> for io::Error {
    fn from(err: TimeoutError) -> Self {
        let kind = match &err {
            TimeoutError::Expired(_) => io::ErrorKind::TimedOut,
            TimeoutError::InvalidDuration(_) | TimeoutError::StalePrepared => {
                io::ErrorKind::InvalidInput
            }
            TimeoutError::Setup(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ErrorSpec, TimeoutEntry};

    fn expired_error() -> TimeoutError {
        let entry = TimeoutEntry::new(Duration::from_secs(1), ErrorSpec::Default);
        TimeoutError::Expired(entry.to_expired(entry.deadline_ms() + 1))
    }

    #[test]
    fn test_expired_accessors() {
        let err = expired_error();
        assert!(err.is_expired());
        assert!(err.expired().is_some());
        assert!(!TimeoutError::StalePrepared.is_expired());
        assert!(TimeoutError::InvalidDuration(Duration::ZERO).expired().is_none());
    }

    #[test]
    fn test_io_error_kinds() {
        let io_err: io::Error = expired_error().into();
        assert_eq!(io_err.kind(), io::ErrorKind::TimedOut);

        let io_err: io::Error = TimeoutError::InvalidDuration(Duration::ZERO).into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidInput);

        let io_err: io::Error = TimeoutError::StalePrepared.into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_display() {
        let err = TimeoutError::InvalidDuration(Duration::ZERO);
        assert!(err.to_string().contains("positive duration"));
        assert!(expired_error().to_string().contains("execution expired"));
    }
}
