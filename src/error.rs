//! Error types for the harvesting engine.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while driving a browser session over a page.
///
/// Extraction misses and stale DOM references never surface here: the
/// extractor degrades them to empty metrics at the point of occurrence.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The browser session, window or DevTools connection is gone.
    #[error("browser session lost: {0}")]
    SessionLost(String),

    /// Navigation or script execution exceeded its hard timeout.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    /// Any other failure reported by the browser backend.
    #[error("browser error: {0}")]
    Browser(String),

    /// A page script ran but returned something unusable.
    #[error("script error: {0}")]
    Script(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("credential bundle error: {0}")]
    Credentials(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message fragments browsers use when a session can no longer be driven.
const SESSION_LOST_MARKERS: &[&str] = &[
    "session",
    "no such window",
    "target closed",
    "connection",
    "websocket",
    "channel closed",
    "browser has disconnected",
];

impl HarvestError {
    /// Whether the browser session must be discarded and recreated.
    pub fn is_session_fatal(&self) -> bool {
        match self {
            HarvestError::SessionLost(_) | HarvestError::Timeout { .. } => true,
            HarvestError::Browser(msg) => {
                let msg = msg.to_lowercase();
                SESSION_LOST_MARKERS.iter().any(|m| msg.contains(m))
            }
            _ => false,
        }
    }

    pub fn timeout(operation: &'static str, elapsed: Duration) -> Self {
        HarvestError::Timeout { operation, elapsed }
    }
}

/// Errors raised by channel stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("database connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_lost_and_timeouts_are_fatal() {
        assert!(HarvestError::SessionLost("gone".into()).is_session_fatal());
        assert!(HarvestError::timeout("navigation", Duration::from_secs(30)).is_session_fatal());
    }

    #[test]
    fn browser_errors_are_classified_by_message() {
        assert!(HarvestError::Browser("invalid session id".into()).is_session_fatal());
        assert!(HarvestError::Browser("No such window: target window already closed".into())
            .is_session_fatal());
        assert!(!HarvestError::Browser("Cannot read properties of null".into()).is_session_fatal());
    }

    #[test]
    fn other_failures_are_not_fatal() {
        assert!(!HarvestError::Script("bad json".into()).is_session_fatal());
        assert!(!HarvestError::Authentication("no cookie".into()).is_session_fatal());
        assert!(!HarvestError::Store(StoreError::Timeout(Duration::from_secs(5))).is_session_fatal());
    }
}
