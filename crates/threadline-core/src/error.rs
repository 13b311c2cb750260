//! Error types for Threadline
//!
//! The engine itself never lets these escape a reconciliation pass; they are
//! returned only from the collaborator seams (order source, window moves,
//! fixture loading) and turned into log lines plus report counters.

use thiserror::Error;

use crate::models::{DiscussionId, EntryKey, PostId};

/// Result type alias for Threadline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Threadline
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Order data
    // ==========================================================================
    #[error("Order fetch failed for discussion {discussion_id}: {message}")]
    OrderFetch {
        discussion_id: DiscussionId,
        message: String,
    },

    #[error("Invalid order row for post {post_id}: {message}")]
    InvalidOrderRow { post_id: PostId, message: String },

    // ==========================================================================
    // Window / apply-time races
    // ==========================================================================
    #[error("Entry {0} is no longer attached to the window")]
    Detached(EntryKey),

    #[error("Anchor {0} is no longer attached to the window")]
    AnchorDetached(EntryKey),

    // ==========================================================================
    // Validation
    // ==========================================================================
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ==========================================================================
    // Internal Errors
    // ==========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an order fetch error
    pub fn order_fetch(discussion_id: DiscussionId, message: impl Into<String>) -> Self {
        Self::OrderFetch {
            discussion_id,
            message: message.into(),
        }
    }

    /// Create an invalid order row error
    pub fn invalid_row(post_id: PostId, message: impl Into<String>) -> Self {
        Self::InvalidOrderRow {
            post_id,
            message: message.into(),
        }
    }

    /// Stable error code string for this error.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::OrderFetch { .. } => "ORDER_FETCH_FAILED",
            Self::InvalidOrderRow { .. } => "INVALID_ORDER_ROW",
            Self::Detached(_) => "ENTRY_DETACHED",
            Self::AnchorDetached(_) => "ANCHOR_DETACHED",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the condition is transient: the next structural mutation or
    /// refresh is expected to clear it without intervention.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::OrderFetch { .. } | Self::Detached(_) | Self::AnchorDetached(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            Error::order_fetch(3, "timeout").error_code(),
            "ORDER_FETCH_FAILED"
        );
        assert_eq!(Error::Detached(EntryKey::Post(9)).error_code(), "ENTRY_DETACHED");
        assert_eq!(
            Error::InvalidArgument("x".into()).error_code(),
            "INVALID_ARGUMENT"
        );
    }

    #[test]
    fn display_includes_context() {
        let err = Error::order_fetch(42, "connection reset");
        assert_eq!(
            err.to_string(),
            "Order fetch failed for discussion 42: connection reset"
        );
        let err = Error::AnchorDetached(EntryKey::Opaque(7));
        assert_eq!(
            err.to_string(),
            "Anchor placeholder#7 is no longer attached to the window"
        );
    }

    #[test]
    fn recoverability() {
        assert!(Error::order_fetch(1, "503").is_recoverable());
        assert!(Error::Detached(EntryKey::Post(1)).is_recoverable());
        assert!(!Error::Internal("bug".into()).is_recoverable());
        assert!(!Error::invalid_row(5, "negative order").is_recoverable());
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.json");
        let err: Error = io.into();
        assert_eq!(err.error_code(), "IO_ERROR");
        assert!(err.to_string().contains("missing.json"));
    }
}
