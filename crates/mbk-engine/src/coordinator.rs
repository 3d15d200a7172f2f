//! Refresh-attempt bookkeeping: outcome types and the live-attempt slot.
//!
//! Mutual exclusion itself is a `tokio::sync::Mutex` held across the
//! attempt in `engine.rs`; this module owns the pieces that outlive an
//! attempt — the token that identifies it (so late results from an
//! abandoned attempt can be discarded instead of applied over a newer
//! refresh's conclusion) and the outcome reported to consumers.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use mbk_schemas::SubscriptionState;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// How a `refresh()` call ended. Diagnostics only — gating never reads
/// this; the user-visible state is always the best-known value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The attempt ran to completion. `clean` is false when any consulted
    /// source was unavailable.
    Completed { clean: bool },
    /// Another attempt held the refresh lock; this call was a no-op.
    AlreadyRunning,
    /// The watchdog expired; state was finalized from partial signals.
    WatchdogExpired,
    /// No user is signed in; the signed-out state was published.
    SignedOut,
    /// The attempt was invalidated mid-flight (sign-out, user switch) and
    /// its results were discarded.
    Superseded,
}

/// How a purchase or restore call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseOutcome {
    /// The store confirmed entitlement; the published state is attached.
    Entitled(SubscriptionState),
    /// The flow completed but confirmed no entitlement (e.g. a restore
    /// with nothing to restore).
    NotEntitled,
    /// The user dismissed the sheet. Not an error.
    Cancelled,
    Failed { reason: String },
}

// ---------------------------------------------------------------------------
// RefreshAttempt / AttemptSlot
// ---------------------------------------------------------------------------

/// The live attempt's identity. Transient, in-memory; at most one exists
/// at a time.
#[derive(Debug, Clone)]
pub struct RefreshAttempt {
    pub trigger: String,
    pub token: Uuid,
    pub started_at: DateTime<Utc>,
}

/// Holder for the currently live attempt.
///
/// Results are applied only when the applying code still holds the
/// current token; anything else arrived from an abandoned attempt.
#[derive(Debug, Default)]
pub struct AttemptSlot {
    current: Mutex<Option<RefreshAttempt>>,
}

impl AttemptSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new attempt, superseding any previous one.
    pub fn begin(&self, trigger: &str) -> Uuid {
        let token = Uuid::new_v4();
        *self.current.lock().expect("attempt lock") = Some(RefreshAttempt {
            trigger: trigger.to_string(),
            token,
            started_at: Utc::now(),
        });
        token
    }

    /// Whether `token` still identifies the live attempt.
    pub fn is_current(&self, token: Uuid) -> bool {
        self.current
            .lock()
            .expect("attempt lock")
            .as_ref()
            .map(|a| a.token == token)
            .unwrap_or(false)
    }

    /// Finish the attempt identified by `token`. A stale token is a no-op
    /// (a newer attempt already owns the slot).
    pub fn finish(&self, token: Uuid) {
        let mut slot = self.current.lock().expect("attempt lock");
        if slot.as_ref().map(|a| a.token == token).unwrap_or(false) {
            *slot = None;
        }
    }

    /// Invalidate whatever attempt is live (sign-out, user switch).
    pub fn invalidate(&self) {
        *self.current.lock().expect("attempt lock") = None;
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
