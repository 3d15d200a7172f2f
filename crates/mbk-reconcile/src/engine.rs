use chrono::{DateTime, Utc};

use crate::{
    Decision, DecisionNote, DecisionRule, ProfileSignal, SignalSet, SignalSource, SourceSignal,
};
use mbk_schemas::{
    EntitlementProvider, EntitlementSnapshot, ProfileRecord, SubscriptionState,
    SubscriptionStatus,
};

fn push_note_once(notes: &mut Vec<DecisionNote>, n: DecisionNote) {
    if !notes.contains(&n) {
        notes.push(n);
    }
}

/// Map a confirmed-positive snapshot into the published state shape.
fn state_from_snapshot(
    snap: &EntitlementSnapshot,
    provider: EntitlementProvider,
) -> SubscriptionState {
    SubscriptionState {
        status: if snap.is_trialing {
            SubscriptionStatus::Trialing
        } else {
            SubscriptionStatus::Active
        },
        plan_type: snap.plan_type,
        period_end_date: snap.expiration_date,
        provider: Some(provider),
        is_loading: false,
    }
}

/// Map the profile record's own status field (rule 5) into state.
fn state_from_profile(rec: &ProfileRecord) -> SubscriptionState {
    SubscriptionState {
        status: rec.subscription_status,
        plan_type: rec.subscription_type,
        period_end_date: if rec.subscription_status == SubscriptionStatus::Trialing {
            rec.trial_end_date.or(rec.subscription_end_date)
        } else {
            rec.subscription_end_date
        },
        provider: Some(EntitlementProvider::Profile),
        is_loading: false,
    }
}

/// Record an availability note for each consulted-but-unavailable source.
fn note_unavailable_sources(signals: &SignalSet, notes: &mut Vec<DecisionNote>) {
    if matches!(signals.native, Some(SourceSignal::Unavailable { .. })) {
        push_note_once(notes, DecisionNote::Unavailable { source: SignalSource::Native });
    }
    if matches!(signals.gateway, Some(SourceSignal::Unavailable { .. })) {
        push_note_once(notes, DecisionNote::Unavailable { source: SignalSource::Gateway });
    }
    if matches!(signals.profile, Some(ProfileSignal::Unavailable { .. })) {
        push_note_once(notes, DecisionNote::Unavailable { source: SignalSource::Profile });
    }
}

/// Note when a lower-priority entitled signal disagrees on plan type with
/// the plan we are about to publish. Both signals agree the user is
/// entitled; the purchase-record value wins.
fn note_plan_conflicts(
    chosen: &EntitlementSnapshot,
    signals: &SignalSet,
    skip_gateway: bool,
    notes: &mut Vec<DecisionNote>,
) {
    let Some(kept) = chosen.plan_type else {
        return;
    };

    if !skip_gateway {
        if let Some(gw) = signals.gateway.as_ref().and_then(SourceSignal::confirmed_positive) {
            if let Some(other) = gw.plan_type {
                if other != kept {
                    push_note_once(
                        notes,
                        DecisionNote::PlanTypeConflict { kept, discarded: other },
                    );
                }
            }
        }
    }

    if let Some(rec) = signals.profile.as_ref().and_then(ProfileSignal::record) {
        if rec.subscription_status.is_entitled() {
            if let Some(other) = rec.subscription_type {
                if other != kept {
                    push_note_once(
                        notes,
                        DecisionNote::PlanTypeConflict { kept, discarded: other },
                    );
                }
            }
        }
    }
}

/// Fold one refresh attempt's signals into the authoritative state.
///
/// Precedence, first match wins:
///
/// 1. Lifetime or unexpired promotional grant on the profile record
/// 2. Confirmed-positive native signal
/// 3. Confirmed-positive gateway signal
/// 4. Fresh same-user cache record (caller-validated)
/// 5. The profile record's own status field
/// 6. No entitlement
///
/// Two guards sit across the rules:
///
/// - **Anti-downgrade**: rule 5 cannot fire with a `none` profile reading
///   when a same-attempt purchase signal was positive — rules 2/3 have
///   already won, and the discarded profile reading is recorded as a note.
/// - **Inconclusive-keeps-prior**: when *no* consulted source produced a
///   confirmed reading and no usable cache exists, a previously entitled
///   `prior` state is kept instead of downgraded. An unreachable source is
///   not evidence of cancellation.
///
/// Expiry is never enforced against the local clock; the one exception is
/// `promotional_access_end`, an out-of-band grant with no source boolean
/// behind it, which is compared against the caller-supplied `now`.
pub fn reconcile(signals: &SignalSet, prior: &SubscriptionState, now: DateTime<Utc>) -> Decision {
    let mut notes: Vec<DecisionNote> = Vec::new();
    note_unavailable_sources(signals, &mut notes);

    let profile_record = signals.profile.as_ref().and_then(ProfileSignal::record);

    // 1) Out-of-band grants: highest priority, unconditional.
    if let Some(rec) = profile_record {
        if rec.lifetime_access {
            return Decision {
                state: SubscriptionState {
                    status: SubscriptionStatus::Active,
                    plan_type: None,
                    period_end_date: None,
                    provider: Some(EntitlementProvider::Lifetime),
                    is_loading: false,
                },
                rule: DecisionRule::LifetimeGrant,
                notes,
            };
        }
        if rec.has_promotional_access(now) {
            return Decision {
                state: SubscriptionState {
                    status: SubscriptionStatus::Active,
                    plan_type: None,
                    period_end_date: rec.promotional_access_end,
                    provider: Some(EntitlementProvider::Promotional),
                    is_loading: false,
                },
                rule: DecisionRule::PromotionalGrant,
                notes,
            };
        }
    }

    let profile_says_none = profile_record
        .map(|rec| rec.subscription_status == SubscriptionStatus::None)
        .unwrap_or(false);

    // 2) Confirmed-positive native signal.
    if let Some(snap) = signals.native.as_ref().and_then(SourceSignal::confirmed_positive) {
        note_plan_conflicts(snap, signals, false, &mut notes);
        if profile_says_none {
            push_note_once(&mut notes, DecisionNote::ProfileDowngradeSuppressed);
        }
        return Decision {
            state: state_from_snapshot(snap, EntitlementProvider::Native),
            rule: DecisionRule::NativePositive,
            notes,
        };
    }

    // 3) Confirmed-positive gateway signal.
    if let Some(snap) = signals.gateway.as_ref().and_then(SourceSignal::confirmed_positive) {
        note_plan_conflicts(snap, signals, true, &mut notes);
        if profile_says_none {
            push_note_once(&mut notes, DecisionNote::ProfileDowngradeSuppressed);
        }
        return Decision {
            state: state_from_snapshot(snap, EntitlementProvider::Gateway),
            rule: DecisionRule::GatewayPositive,
            notes,
        };
    }

    // 4) Fresh same-user cache record (stale-while-revalidate: the caller
    //    keeps a live confirmation running in the background).
    if let Some(cached) = &signals.cache {
        if cached.is_pro {
            let snap = cached.to_snapshot();
            return Decision {
                state: state_from_snapshot(&snap, EntitlementProvider::Cache),
                rule: DecisionRule::CacheFallback,
                notes,
            };
        }
        // Only positives are ever written; an alien non-positive record is
        // ignored rather than trusted.
        push_note_once(&mut notes, DecisionNote::NonPositiveCacheIgnored);
    }

    // 5) The profile record's own status field.
    if let Some(rec) = profile_record {
        if rec.subscription_status != SubscriptionStatus::None {
            return Decision {
                state: state_from_profile(rec),
                rule: DecisionRule::ProfileStatus,
                notes,
            };
        }
    }

    // 6) Nothing positive. Distinguish "confirmed not entitled" from
    //    "could not reach anything".
    if !signals.has_confirmed_signal() && prior.is_entitled() {
        return Decision {
            state: prior.with_loading(false),
            rule: DecisionRule::InconclusiveKeptPrior,
            notes,
        };
    }

    Decision {
        state: SubscriptionState {
            status: SubscriptionStatus::None,
            plan_type: None,
            period_end_date: None,
            provider: None,
            is_loading: false,
        },
        rule: DecisionRule::NoEntitlement,
        notes,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
