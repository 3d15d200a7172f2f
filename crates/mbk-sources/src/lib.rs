//! mbk-sources
//!
//! Source adapter boundary for the entitlement engine. This crate owns the
//! purchase-bridge trait and the three concrete adapters (native, gateway,
//! profile). It performs reads only; folding signals into state belongs to
//! the reconciler, persistence to the cache crate.
//!
//! The one rule every adapter obeys: a read that *could not complete* is
//! [`SourceRead::Unavailable`], which is a different thing from a completed
//! read that says "not entitled". Adapters never collapse the two.

use std::fmt;
use std::time::Duration;

use mbk_schemas::EntitlementSnapshot;

pub mod bridge;
mod gateway;
mod native;
mod profile;

pub use bridge::PurchaseBridge;
pub use gateway::GatewaySource;
pub use native::NativeSource;
pub use profile::{ProfileRead, ProfileSource};

// ---------------------------------------------------------------------------
// SourceRead
// ---------------------------------------------------------------------------

/// Outcome of one adapter read.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRead {
    /// The source completed a read for the asked-about user. The snapshot
    /// may be positive or a confirmed negative.
    Confirmed(EntitlementSnapshot),
    /// The source answered for a *different* user than the one currently
    /// authenticated. The reading must be discarded and the caller should
    /// clear the persistent cache for safety.
    IdentityMismatch { expected: String, got: String },
    /// The source could not be read. Retryable; never treated as negative.
    Unavailable { reason: String },
}

impl SourceRead {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        SourceRead::Unavailable {
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SourceError
// ---------------------------------------------------------------------------

/// Errors a source adapter or purchase bridge may produce.
#[derive(Debug)]
pub enum SourceError {
    /// Network or bridge transport failure (including timeouts).
    Transport(String),
    /// The upstream service returned an application-level error.
    Api { code: Option<u16>, message: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// A required configuration value (e.g. API key) is missing or invalid.
    Config(String),
    /// The user dismissed a purchase/restore sheet. Not a failure.
    Cancelled,
    /// The bridge has not been identified for the current user; readings
    /// taken now could belong to a previously-active device user.
    NotIdentified,
}

impl SourceError {
    /// Whether retrying the same call can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Transport(_) => true,
            SourceError::Api { code: Some(c), .. } => *c >= 500,
            SourceError::Api { code: None, .. } => false,
            SourceError::Decode(_)
            | SourceError::Config(_)
            | SourceError::Cancelled
            | SourceError::NotIdentified => false,
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Transport(msg) => write!(f, "transport error: {msg}"),
            SourceError::Api {
                code: Some(c),
                message,
            } => write!(f, "api error code={c}: {message}"),
            SourceError::Api {
                code: None,
                message,
            } => write!(f, "api error: {message}"),
            SourceError::Decode(msg) => write!(f, "decode error: {msg}"),
            SourceError::Config(msg) => write!(f, "config error: {msg}"),
            SourceError::Cancelled => write!(f, "cancelled by user"),
            SourceError::NotIdentified => write!(f, "bridge not identified for current user"),
        }
    }
}

impl std::error::Error for SourceError {}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded retry for HTTP adapters: an explicit attempt counter and delay,
/// never implicit recursion.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(250),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_server_errors_are_retryable() {
        assert!(SourceError::Transport("timeout".into()).is_retryable());
        assert!(SourceError::Api {
            code: Some(503),
            message: "unavailable".into()
        }
        .is_retryable());
    }

    #[test]
    fn client_errors_and_cancellation_are_not_retryable() {
        assert!(!SourceError::Api {
            code: Some(401),
            message: "unauthorized".into()
        }
        .is_retryable());
        assert!(!SourceError::Decode("bad json".into()).is_retryable());
        assert!(!SourceError::Cancelled.is_retryable());
        assert!(!SourceError::NotIdentified.is_retryable());
    }

    #[test]
    fn source_error_display_shapes() {
        let err = SourceError::Api {
            code: Some(500),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "api error code=500: boom");
        assert_eq!(
            SourceError::Transport("connection refused".into()).to_string(),
            "transport error: connection refused"
        );
    }
}
