//! Domain-specific error types for the BTKB relay.
//!
//! Malformed command input is never an error: it degrades silently inside
//! the interpreter. What remains here are resource failures and failures
//! reported by the peripheral session.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The canonical error type for the relay core.
#[derive(Debug, Error)]
pub enum RelayError {
    // ── Rendezvous Errors ────────────────────────────────────────
    /// The command FIFO could not be created, even after removing a
    /// stale one.
    #[error("could not create fifo at {}: {source}", .path.display())]
    Fifo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The reader thread exited, so no further command lines can arrive.
    #[error("command stream reader stopped")]
    ReaderStopped,

    /// Every receiver of a channel was dropped.
    #[error("channel closed")]
    ChannelClosed,

    /// Filesystem or thread I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    // ── Session Errors ───────────────────────────────────────────
    /// The peripheral session reported a failure that cannot be recovered.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── SessionError ──────────────────────────────────────────────────

/// Typed failure reported by a [`PeripheralSession`](crate::PeripheralSession).
///
/// The session implementation decides the class at the point of failure;
/// callers branch on [`is_transient`](Self::is_transient) instead of
/// inspecting message text.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The remote call timed out without a reply.
    #[error("no reply from peer within {0:?}")]
    Timeout(Duration),

    /// The peer is gone (or was never attached). Expected to clear up once
    /// the session owner reconnects.
    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),

    /// Any other failure. Terminates the relay.
    #[error("permanent session failure: {0}")]
    Permanent(String),

    /// I/O failure the session did not classify as a lost peer.
    #[error("session i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Returns `true` for failures that should trigger a lifecycle re-check
    /// rather than stop the relay.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::PeerUnavailable(_))
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for RelayError {
    fn from(s: String) -> Self {
        RelayError::Other(s)
    }
}

impl From<&str> for RelayError {
    fn from(s: &str) -> Self {
        RelayError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for RelayError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        RelayError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_error_names_the_path() {
        let e = RelayError::Fifo {
            path: PathBuf::from("/tmp/btkb.fifo"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(e.to_string().contains("/tmp/btkb.fifo"));
        assert!(e.to_string().contains("denied"));
    }

    #[test]
    fn transient_classification() {
        assert!(SessionError::Timeout(Duration::from_millis(50)).is_transient());
        assert!(SessionError::PeerUnavailable("gone".into()).is_transient());
        assert!(!SessionError::Permanent("bad".into()).is_transient());

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        assert!(!SessionError::from(io).is_transient());
    }

    #[test]
    fn from_session_error() {
        let e: RelayError = SessionError::Permanent("bus gone".into()).into();
        assert!(matches!(e, RelayError::Session(_)));
    }

    #[test]
    fn from_string() {
        let e: RelayError = "something broke".into();
        assert!(matches!(e, RelayError::Other(_)));
    }
}
