use mbk_schemas::{
    CachedEntitlement, EntitlementSnapshot, PlanType, ProfileRecord, SubscriptionState,
};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Source signals
// ---------------------------------------------------------------------------

/// How a consulted purchase source (native bridge or payment gateway)
/// resolved within one refresh attempt.
///
/// `Unavailable` is a distinct outcome from a confirmed "not entitled"
/// snapshot. Collapsing the two is what causes spurious downgrades, so the
/// distinction is preserved all the way into the fold.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSignal {
    /// The source completed a read. `is_pro == false` here is a confirmed
    /// negative from an identified source.
    Confirmed(EntitlementSnapshot),
    /// The source could not be read (timeout, transport error, not yet
    /// identified). Never treated as negative.
    Unavailable { reason: String },
}

impl SourceSignal {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        SourceSignal::Unavailable {
            reason: reason.into(),
        }
    }

    /// The snapshot, if this signal confirmed a positive entitlement.
    pub fn confirmed_positive(&self) -> Option<&EntitlementSnapshot> {
        match self {
            SourceSignal::Confirmed(snap) if snap.is_pro => Some(snap),
            _ => None,
        }
    }

    pub fn is_confirmed_negative(&self) -> bool {
        matches!(self, SourceSignal::Confirmed(snap) if !snap.is_pro)
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, SourceSignal::Confirmed(_))
    }
}

/// How the profile read resolved within one refresh attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileSignal {
    Record(ProfileRecord),
    Unavailable { reason: String },
}

impl ProfileSignal {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        ProfileSignal::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn record(&self) -> Option<&ProfileRecord> {
        match self {
            ProfileSignal::Record(rec) => Some(rec),
            ProfileSignal::Unavailable { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SignalSet
// ---------------------------------------------------------------------------

/// Inputs to one reconcile pass.
///
/// `None` means the source was not consulted this attempt (e.g. the gateway
/// is skipped on platforms with a native purchase layer, or the watchdog
/// expired before the source returned). The `cache` field carries only a
/// record the caller already validated as fresh and same-user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSet {
    pub native: Option<SourceSignal>,
    pub gateway: Option<SourceSignal>,
    pub profile: Option<ProfileSignal>,
    pub cache: Option<CachedEntitlement>,
}

impl SignalSet {
    /// True when at least one consulted source produced a confirmed reading
    /// (positive or negative). Used for the inconclusive-refresh guard.
    pub fn has_confirmed_signal(&self) -> bool {
        self.native.as_ref().map(SourceSignal::is_confirmed).unwrap_or(false)
            || self.gateway.as_ref().map(SourceSignal::is_confirmed).unwrap_or(false)
            || self.profile.as_ref().and_then(ProfileSignal::record).is_some()
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Which precedence rule produced the decision. Recorded for diagnostics;
/// never used for gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    LifetimeGrant,
    PromotionalGrant,
    NativePositive,
    GatewayPositive,
    CacheFallback,
    ProfileStatus,
    /// No source produced a confirmed reading and the prior state was
    /// entitled; the prior state was kept rather than downgraded.
    InconclusiveKeptPrior,
    NoEntitlement,
}

/// A consulted source, for diagnostic notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Native,
    Gateway,
    Profile,
}

/// Observations recorded while folding. Deduplicated, insertion-ordered
/// (the fold itself is deterministic).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "note", rename_all = "snake_case")]
pub enum DecisionNote {
    /// Profile reported `none` while a same-refresh purchase signal was
    /// positive; the profile reading was discarded.
    ProfileDowngradeSuppressed,
    /// Two positive signals disagreed on plan type only; the value closer
    /// to the purchase record was kept.
    PlanTypeConflict {
        kept: PlanType,
        discarded: PlanType,
    },
    /// A cache record that was not a positive entitlement was ignored.
    NonPositiveCacheIgnored,
    /// A consulted source could not produce a confirmed reading.
    Unavailable { source: SignalSource },
}

/// Outcome of one reconcile pass: the state to publish plus provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub state: SubscriptionState,
    pub rule: DecisionRule,
    pub notes: Vec<DecisionNote>,
}

impl Decision {
    pub fn is_entitled(&self) -> bool {
        self.state.is_entitled()
    }
}
