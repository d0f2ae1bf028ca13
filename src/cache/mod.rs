//! Process-wide data-access cache
//!
//! Every read of server-held data goes through [`DataCache`], which serves
//! fresh entries without touching the network, coalesces concurrent
//! fetches for the same logical request into one transport call, and
//! exposes the invalidation protocol mutating call sites use to drop
//! stale entries. The transport itself is injected per call as an async
//! function; the cache never owns an HTTP client.

mod manager;
mod store;

pub use manager::{CacheConfig, DataCache, FetchOptions};
pub use store::{CacheEntry, FetchStatus};

use thiserror::Error;

/// Errors surfaced by a fetch
///
/// Cloneable on purpose: when several callers join one deduplicated
/// in-flight fetch, a failure is re-raised to each of them.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The transport call was rejected
    #[error("request failed: {message}")]
    Transport {
        /// HTTP-like status code, if the server produced one
        status: Option<u16>,
        /// Human-readable message for user-facing surfaces
        message: String,
    },

    /// The payload did not match the consumer's declared type
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Creates a transport error without a status code
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Creates a transport error carrying an HTTP-like status code
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Returns the status code, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            Self::Decode(_) => None,
        }
    }

    /// True for "not found" outcomes some call sites treat as expected
    /// absence rather than an error worth notifying about
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Notification collaborator invoked on fetch failure
///
/// The cache never renders anything itself; the host application installs
/// a notifier (typically a toast surface) via [`DataCache::with_notifier`]
/// and failures are forwarded to it when the fetch asked for notification.
pub trait Notifier: Send + Sync {
    /// Reports a failed fetch for a resource
    fn error(&self, resource: &str, message: &str);
}

/// Default notifier that drops every notification
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn error(&self, _resource: &str, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display_uses_message() {
        let err = FetchError::with_status(500, "internal server error");
        assert_eq!(err.to_string(), "request failed: internal server error");
    }

    #[test]
    fn test_not_found_detection() {
        assert!(FetchError::with_status(404, "no such bill").is_not_found());
        assert!(!FetchError::with_status(500, "boom").is_not_found());
        assert!(!FetchError::transport("connection reset").is_not_found());
        assert!(!FetchError::Decode("bad shape".to_string()).is_not_found());
    }

    #[test]
    fn test_decode_error_from_serde() {
        let parse_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err = FetchError::from(parse_err);
        assert!(matches!(err, FetchError::Decode(_)));
        assert_eq!(err.status(), None);
    }
}
