//! mbk-schemas
//!
//! Shared data model for the entitlement engine. Plain serde types only:
//! no IO, no clock reads, no adapter logic. Every other crate in the
//! workspace depends on this one and nothing here depends on them.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SubscriptionStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a subscription as reported by the backend / gateway.
///
/// Wire values are snake_case (`"past_due"` etc.), matching the backend's
/// denormalized profile columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    None,
    Trialing,
    Active,
    PastDue,
    Canceled,
    Paused,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Paused => "paused",
        }
    }

    /// Whether this status grants paid access. The single source of truth
    /// for gating: `Trialing` and `Active`, nothing else.
    pub fn is_entitled(&self) -> bool {
        matches!(self, SubscriptionStatus::Trialing | SubscriptionStatus::Active)
    }
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        SubscriptionStatus::None
    }
}

// ---------------------------------------------------------------------------
// PlanType
// ---------------------------------------------------------------------------

/// Billing cadence of the subscription plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Monthly,
    Annual,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Monthly => "monthly",
            PlanType::Annual => "annual",
        }
    }
}

// ---------------------------------------------------------------------------
// EntitlementProvider
// ---------------------------------------------------------------------------

/// Which source last confirmed the current entitlement.
///
/// `Lifetime` and `Promotional` are out-of-band grants carried on the
/// profile record; they outrank every purchase-backed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementProvider {
    Native,
    Gateway,
    Profile,
    Cache,
    Lifetime,
    Promotional,
}

impl EntitlementProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementProvider::Native => "native",
            EntitlementProvider::Gateway => "gateway",
            EntitlementProvider::Profile => "profile",
            EntitlementProvider::Cache => "cache",
            EntitlementProvider::Lifetime => "lifetime",
            EntitlementProvider::Promotional => "promotional",
        }
    }
}

// ---------------------------------------------------------------------------
// SubscriptionState
// ---------------------------------------------------------------------------

/// The single authoritative, observable entitlement value.
///
/// # Invariant
///
/// `status.is_entitled()` is true iff the user currently has paid access.
/// Consumers gate on [`SubscriptionState::is_entitled`] only — never on a
/// raw source signal and never by comparing `period_end_date` to the clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub status: SubscriptionStatus,
    pub plan_type: Option<PlanType>,
    /// Renewal or trial end. Informational only; expiry is not enforced
    /// locally (clock skew would produce false negatives).
    pub period_end_date: Option<DateTime<Utc>>,
    /// Source that last confirmed entitlement. `None` until first decision.
    pub provider: Option<EntitlementProvider>,
    pub is_loading: bool,
}

impl SubscriptionState {
    /// Initial boot state: nothing known yet, a first refresh is expected.
    pub fn initial() -> Self {
        Self {
            status: SubscriptionStatus::None,
            plan_type: None,
            period_end_date: None,
            provider: None,
            is_loading: true,
        }
    }

    /// State after sign-out: no entitlement, nothing in flight.
    pub fn signed_out() -> Self {
        Self {
            status: SubscriptionStatus::None,
            plan_type: None,
            period_end_date: None,
            provider: None,
            is_loading: false,
        }
    }

    pub fn is_entitled(&self) -> bool {
        self.status.is_entitled()
    }

    /// Copy of this state with `is_loading` replaced.
    pub fn with_loading(&self, is_loading: bool) -> Self {
        Self {
            is_loading,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// EntitlementSnapshot
// ---------------------------------------------------------------------------

/// One source's timestamped view of entitlement.
///
/// Produced by a source adapter on every successful read. `is_pro == false`
/// from an *identified* source is a confirmed negative; adapters that could
/// not complete a read produce no snapshot at all (the unavailable/negative
/// distinction lives at the adapter boundary, not here).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementSnapshot {
    pub user_id: String,
    pub is_pro: bool,
    pub is_trialing: bool,
    pub plan_type: Option<PlanType>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub captured_at: DateTime<Utc>,
}

impl EntitlementSnapshot {
    pub fn positive(
        user_id: impl Into<String>,
        is_trialing: bool,
        plan_type: Option<PlanType>,
        expiration_date: Option<DateTime<Utc>>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            is_pro: true,
            is_trialing,
            plan_type,
            expiration_date,
            captured_at,
        }
    }

    /// A confirmed "not entitled" reading from an identified source.
    pub fn negative(user_id: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            is_pro: false,
            is_trialing: false,
            plan_type: None,
            expiration_date: None,
            captured_at,
        }
    }
}

// ---------------------------------------------------------------------------
// CachedEntitlement
// ---------------------------------------------------------------------------

/// On-disk cache record: the last confirmed-positive snapshot plus the
/// write timestamp used for age validation.
///
/// The serialized shape is a single camelCase JSON object —
/// `{userId, isPro, isTrialing, planType, expirationDate, timestamp}` —
/// and must stay stable across releases: records written by an older build
/// are read back after the embedding web-view is torn down and recreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntitlement {
    pub user_id: String,
    pub is_pro: bool,
    pub is_trialing: bool,
    pub plan_type: Option<PlanType>,
    pub expiration_date: Option<DateTime<Utc>>,
    /// Unix epoch milliseconds at write time.
    pub timestamp: i64,
}

impl CachedEntitlement {
    pub fn from_snapshot(snapshot: &EntitlementSnapshot, written_at: DateTime<Utc>) -> Self {
        Self {
            user_id: snapshot.user_id.clone(),
            is_pro: snapshot.is_pro,
            is_trialing: snapshot.is_trialing,
            plan_type: snapshot.plan_type,
            expiration_date: snapshot.expiration_date,
            timestamp: written_at.timestamp_millis(),
        }
    }

    /// Reconstruct a snapshot view of this record. `captured_at` is the
    /// cache write time (millisecond precision).
    pub fn to_snapshot(&self) -> EntitlementSnapshot {
        let captured_at = Utc
            .timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_else(Utc::now);
        EntitlementSnapshot {
            user_id: self.user_id.clone(),
            is_pro: self.is_pro,
            is_trialing: self.is_trialing,
            plan_type: self.plan_type,
            expiration_date: self.expiration_date,
            captured_at,
        }
    }

    /// Age of this record relative to `now`, in milliseconds. Records with
    /// a future timestamp (clock rollback) report age 0.
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now.timestamp_millis() - self.timestamp).max(0)
    }
}

// ---------------------------------------------------------------------------
// ProfileRecord
// ---------------------------------------------------------------------------

/// The backend's denormalized subscription fields for one user.
///
/// This record is a derived view fed by payment webhooks and can lag the
/// authoritative payment state; the reconciler treats its `none` reading
/// accordingly. `lifetime_access` and `promotional_access_end` are
/// out-of-band grants that do not correspond to any purchase record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(default)]
    pub subscription_status: SubscriptionStatus,
    pub subscription_type: Option<PlanType>,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub trial_end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lifetime_access: bool,
    pub promotional_access_end: Option<DateTime<Utc>>,
}

impl ProfileRecord {
    /// Whether an unexpired promotional grant is present at `now`.
    pub fn has_promotional_access(&self, now: DateTime<Utc>) -> bool {
        self.promotional_access_end.map(|end| end > now).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// GatewayStatus
// ---------------------------------------------------------------------------

/// Response body of the payment-gateway status check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    #[serde(default)]
    pub status: SubscriptionStatus,
    pub plan_type: Option<PlanType>,
    pub period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_entitled: bool,
}

impl GatewayStatus {
    /// Convert the gateway's view into a snapshot for `user_id`.
    pub fn to_snapshot(&self, user_id: &str, captured_at: DateTime<Utc>) -> EntitlementSnapshot {
        EntitlementSnapshot {
            user_id: user_id.to_string(),
            is_pro: self.is_entitled,
            is_trialing: self.status == SubscriptionStatus::Trialing,
            plan_type: self.plan_type,
            expiration_date: if self.status == SubscriptionStatus::Trialing {
                self.trial_end.or(self.period_end)
            } else {
                self.period_end
            },
            captured_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
