//! The entitlement engine: one owned instance that merges source signals
//! into the single authoritative [`SubscriptionState`].
//!
//! # Write discipline
//!
//! The in-memory state and the persistent cache are written only while
//! the refresh lock is held (or from the purchase / restore / sign-out
//! paths, which serialize on the same lock or run with the live attempt
//! invalidated). Read-modify-write races are impossible by construction
//! rather than by locking the state itself.
//!
//! # What callers see
//!
//! Consumers read [`EntitlementEngine::state`] or subscribe to the watch
//! channel; gating goes through [`EntitlementEngine::can_perform_gated_action`].
//! Refresh outcomes are diagnostics only — a transient failure leaves the
//! best-known state in place, never an error screen.

use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use mbk_cache::{CacheLookup, EntitlementCache};
use mbk_config::{EngineConfig, Platform};
use mbk_reconcile::{
    reconcile, Decision, DecisionNote, DecisionRule, ProfileSignal, SignalSet, SourceSignal,
};
use mbk_schemas::{CachedEntitlement, SubscriptionState};
use mbk_sources::{
    GatewaySource, NativeSource, ProfileRead, ProfileSource, PurchaseBridge, RetryPolicy,
    SourceError, SourceRead,
};

use crate::coordinator::{AttemptSlot, PurchaseOutcome, RefreshOutcome};
use crate::stabilizer::{ResumeStabilizer, StreakVerdict};

// ---------------------------------------------------------------------------
// AuthSession
// ---------------------------------------------------------------------------

/// The engine's view of the host app's authentication subsystem.
///
/// Real hosts wire their session store behind this trait; tests use a
/// fixed stub. The engine never caches the answers — identity can change
/// between calls and the freshest view always wins.
pub trait AuthSession: Send + Sync {
    /// Currently signed-in user, if any.
    fn user_id(&self) -> Option<String>;

    /// Bearer token for backend calls, if a session is live.
    fn access_token(&self) -> Option<String>;

    /// Non-entitlement metadata pushed to the purchase backend after
    /// identification (display name, cohort attributes).
    fn subscriber_attributes(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// EntitlementEngine
// ---------------------------------------------------------------------------

struct EngineInner<B: PurchaseBridge + 'static> {
    config: EngineConfig,
    /// Purchase-SDK public key, resolved from the configured env var.
    api_key: Option<String>,
    native: NativeSource<B>,
    gateway: GatewaySource,
    profile: ProfileSource,
    cache: EntitlementCache,
    auth: Arc<dyn AuthSession>,
    state_tx: watch::Sender<SubscriptionState>,
    /// Mutual exclusion across refresh attempts. `try_lock` semantics: a
    /// request while one is running is a logged no-op, never queued.
    refresh_lock: tokio::sync::Mutex<()>,
    attempts: AttemptSlot,
    stabilizer: StdMutex<ResumeStabilizer>,
    #[cfg(feature = "testkit")]
    mock_state: StdMutex<Option<SubscriptionState>>,
}

/// Handle to the engine. Cheap to clone; every clone observes and drives
/// the same instance.
pub struct EntitlementEngine<B: PurchaseBridge + 'static> {
    inner: Arc<EngineInner<B>>,
}

impl<B: PurchaseBridge + 'static> Clone for EntitlementEngine<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: PurchaseBridge + 'static> EntitlementEngine<B> {
    /// Build the engine from validated configuration plus the host's
    /// bridge and auth wiring.
    pub fn new(config: EngineConfig, bridge: Arc<B>, auth: Arc<dyn AuthSession>) -> Result<Self> {
        config.validate().context("engine config invalid")?;

        let api_key = std::env::var(&config.native.api_key_env).ok();
        if config.platform == Platform::Native && api_key.is_none() {
            tracing::warn!(
                env = %config.native.api_key_env,
                "purchase api key env var not set; native entitlement checks disabled"
            );
        }

        let gateway = GatewaySource::new(
            config.gateway.base_url.clone(),
            config.gateway.timeout(),
            RetryPolicy {
                max_attempts: config.gateway.retry_max_attempts,
                delay: config.gateway.retry_delay(),
            },
        );
        let profile = ProfileSource::new(config.profile.base_url.clone(), config.profile.timeout());
        let cache = EntitlementCache::new(config.cache.path.clone());
        let stabilizer = ResumeStabilizer::new(
            config.stabilizer.negative_streak_threshold,
            config.stabilizer.negative_streak_cap,
        );
        let (state_tx, _rx) = watch::channel(SubscriptionState::initial());

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                api_key,
                native: NativeSource::new(bridge),
                gateway,
                profile,
                cache,
                auth,
                state_tx,
                refresh_lock: tokio::sync::Mutex::new(()),
                attempts: AttemptSlot::new(),
                stabilizer: StdMutex::new(stabilizer),
                #[cfg(feature = "testkit")]
                mock_state: StdMutex::new(None),
            }),
        })
    }

    // -- consumer API -------------------------------------------------------

    /// Last-reconciled state, synchronously.
    pub fn state(&self) -> SubscriptionState {
        #[cfg(feature = "testkit")]
        if let Some(mock) = self.inner.mock_state.lock().expect("mock lock").clone() {
            return mock;
        }
        self.inner.current_state()
    }

    /// Observe every published state, starting with the current one.
    pub fn subscribe(&self) -> watch::Receiver<SubscriptionState> {
        self.inner.state_tx.subscribe()
    }

    /// Convenience gate layered on [`state`][Self::state]: may the user
    /// perform a subscription-gated action right now?
    pub fn can_perform_gated_action(&self) -> bool {
        self.state().is_entitled()
    }

    /// Current consecutive-negative resume streak (diagnostics).
    pub fn negative_streak(&self) -> u8 {
        self.inner.stabilizer.lock().expect("stabilizer lock").streak()
    }

    /// Run one refresh attempt. See [`RefreshOutcome`] for how it ended;
    /// the outcome is diagnostic, the published state is the product.
    pub async fn refresh(&self, trigger: &str) -> RefreshOutcome {
        self.refresh_inner(trigger, false).await
    }

    /// Kick off the boot refresh. Call once after construction, from
    /// inside the runtime; the handle is for tests, hosts may drop it.
    pub fn start(&self) -> JoinHandle<RefreshOutcome> {
        let engine = self.clone();
        tokio::spawn(async move { engine.refresh_inner("boot", false).await })
    }

    // -- lifecycle hooks ----------------------------------------------------

    /// App returned to foreground.
    ///
    /// Consults the persistent cache first: a fresh positive record is
    /// adopted immediately so the UI is never held waiting on live
    /// adapters. Verification then runs in the background; the returned
    /// handle is for tests and diagnostics, hosts may drop it.
    pub async fn on_app_foreground(&self) -> Option<JoinHandle<RefreshOutcome>> {
        let inner = &self.inner;
        let user_id = inner.auth.user_id()?;

        let now = Utc::now();
        let lookup = inner.cache.load(&user_id, now, inner.max_cache_age());
        match &lookup {
            CacheLookup::Fresh(rec) if rec.is_pro => {
                let prior = inner.current_state();
                let signals = SignalSet {
                    cache: Some(rec.clone()),
                    ..Default::default()
                };
                let decision = reconcile(&signals, &prior, now);
                inner.publish(decision.state);
                tracing::info!("adopted cached entitlement on resume; verifying in background");
            }
            lookup => {
                if let Some(hint) = lookup.hint() {
                    tracing::debug!(
                        age_ms = hint.age_ms(now),
                        "cache record not usable on resume"
                    );
                }
            }
        }

        let engine = self.clone();
        Some(tokio::spawn(async move {
            engine.refresh_inner("app-foreground", true).await
        }))
    }

    /// A user signed in.
    ///
    /// The actual work (bridge configure + identify, then a refresh) is
    /// deferred onto the runtime rather than executed inside the auth
    /// callback: the auth subsystem and this engine may share a
    /// credential lock, and nesting async calls inside the transition
    /// risks deadlocking it on cold start.
    pub fn on_auth_signed_in(&self, user_id: &str) -> JoinHandle<RefreshOutcome> {
        let engine = self.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            engine.handle_sign_in(&user_id).await;
            engine.refresh_inner("auth-signed-in", false).await
        })
    }

    /// The user signed out: discard everything user-scoped.
    pub fn on_auth_signed_out(&self) -> JoinHandle<()> {
        let inner = &self.inner;
        inner.attempts.invalidate();
        inner.stabilizer.lock().expect("stabilizer lock").reset();
        if let Err(err) = inner.cache.clear() {
            tracing::warn!(%err, "cache clear on sign-out failed");
        }
        inner.publish(SubscriptionState::signed_out());

        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.inner.native.logout().await {
                tracing::debug!(%err, "bridge logout failed");
            }
        })
    }

    // -- purchase flows -----------------------------------------------------

    /// Run the native purchase flow for `plan_ref` and fold its result.
    pub async fn purchase(&self, plan_ref: &str) -> PurchaseOutcome {
        let inner = &self.inner;
        let _guard = inner.refresh_lock.lock().await;

        match inner.native.purchase(plan_ref).await {
            Ok(snap) if snap.is_pro => {
                let state = inner.adopt_positive_snapshot(&snap);
                PurchaseOutcome::Entitled(state)
            }
            Ok(_) => PurchaseOutcome::NotEntitled,
            Err(SourceError::Cancelled) => {
                tracing::info!(plan_ref, "purchase cancelled by user");
                PurchaseOutcome::Cancelled
            }
            Err(err) => PurchaseOutcome::Failed {
                reason: err.to_string(),
            },
        }
    }

    /// Replay historical purchases against the store account.
    ///
    /// A restore that completes with a confirmed negative is one of the
    /// two events allowed to clear the persistent cache.
    pub async fn restore_purchases(&self) -> PurchaseOutcome {
        let inner = &self.inner;
        let _guard = inner.refresh_lock.lock().await;

        match inner.native.restore().await {
            Ok(snap) if snap.is_pro => {
                let state = inner.adopt_positive_snapshot(&snap);
                PurchaseOutcome::Entitled(state)
            }
            Ok(_) => {
                tracing::info!("restore confirmed no entitlement; clearing cache");
                if let Err(err) = inner.cache.clear() {
                    tracing::warn!(%err, "cache clear after restore failed");
                }
                // Still signed in, just confirmed not entitled.
                inner.publish(SubscriptionState {
                    status: mbk_schemas::SubscriptionStatus::None,
                    plan_type: None,
                    period_end_date: None,
                    provider: None,
                    is_loading: false,
                });
                PurchaseOutcome::NotEntitled
            }
            Err(SourceError::Cancelled) => PurchaseOutcome::Cancelled,
            Err(err) => PurchaseOutcome::Failed {
                reason: err.to_string(),
            },
        }
    }

    // -- dev override (testkit builds only) ---------------------------------

    /// Force a mock state for UI testing. `None` returns control to the
    /// real pipeline. While a mock is set, refreshes are no-ops.
    #[cfg(feature = "testkit")]
    pub fn set_mock_state(&self, state: Option<SubscriptionState>) {
        let mut slot = self.inner.mock_state.lock().expect("mock lock");
        *slot = state.clone();
        drop(slot);
        if let Some(s) = state {
            self.inner.publish(s);
        }
    }

    // -- internals ----------------------------------------------------------

    async fn handle_sign_in(&self, user_id: &str) {
        let inner = &self.inner;
        if inner.config.platform != Platform::Native {
            return;
        }

        let Some(api_key) = inner.api_key.clone() else {
            return;
        };
        if let Err(err) = inner.native.ensure_configured(&api_key).await {
            tracing::warn!(%err, "purchase bridge configure failed");
            return;
        }

        // Identify is a bridge call like any other: bound it so a hung
        // store cannot stall the sign-in pipeline past the watchdog.
        let attributes = inner.auth.subscriber_attributes();
        let identify = inner.native.identify(user_id, attributes);
        let identified = match tokio::time::timeout(inner.config.refresh.watchdog(), identify).await
        {
            Ok(read) => read,
            Err(_) => {
                tracing::warn!("bridge identify timed out on sign-in");
                return;
            }
        };
        match identified {
            SourceRead::IdentityMismatch { expected, got } => {
                tracing::warn!(%expected, %got, "identity mismatch on sign-in; clearing cache");
                if let Err(err) = inner.cache.clear() {
                    tracing::warn!(%err, "cache clear failed");
                }
            }
            SourceRead::Confirmed(_) => {}
            SourceRead::Unavailable { reason } => {
                tracing::debug!(%reason, "bridge identify unavailable on sign-in");
            }
        }
    }

    async fn refresh_inner(&self, trigger: &str, resume: bool) -> RefreshOutcome {
        let inner = &self.inner;

        #[cfg(feature = "testkit")]
        if inner.mock_state.lock().expect("mock lock").is_some() {
            tracing::debug!(trigger, "mock state active; skipping refresh");
            return RefreshOutcome::Completed { clean: true };
        }

        // Mutual exclusion: concurrent requests are dropped, not queued.
        let Ok(_guard) = inner.refresh_lock.try_lock() else {
            tracing::debug!(trigger, "refresh already running; skipping");
            return RefreshOutcome::AlreadyRunning;
        };

        let Some(user_id) = inner.auth.user_id() else {
            inner.publish(SubscriptionState::signed_out());
            return RefreshOutcome::SignedOut;
        };

        let token = inner.attempts.begin(trigger);
        let prior = inner.current_state();
        inner.publish(prior.with_loading(true));
        tracing::debug!(trigger, "refresh started");

        // Seed with the cache before live reads so rule 4 has its input
        // even when every adapter hangs.
        let mut seed = SignalSet::default();
        match inner.cache.load(&user_id, Utc::now(), inner.max_cache_age()) {
            CacheLookup::Fresh(rec) => seed.cache = Some(rec),
            CacheLookup::StaleAged(rec) => {
                tracing::debug!(age_ms = rec.age_ms(Utc::now()), "stale cache record ignored");
            }
            CacheLookup::UserMismatch => {
                tracing::warn!("cache record from another user; clearing");
                if let Err(err) = inner.cache.clear() {
                    tracing::warn!(%err, "cache clear failed");
                }
            }
            CacheLookup::Missing => {}
        }

        let partial = Arc::new(StdMutex::new(seed));
        let gather = inner.gather_live_signals(&user_id, Arc::clone(&partial));
        let expired = match tokio::time::timeout(inner.config.refresh.watchdog(), gather).await {
            Ok(()) => false,
            Err(_) => {
                tracing::warn!(trigger, "refresh watchdog expired; finalizing from partial signals");
                true
            }
        };

        // A sign-out or user switch mid-flight invalidates the attempt;
        // its readings must not overwrite the newer conclusion.
        if !inner.attempts.is_current(token) {
            tracing::debug!(trigger, "refresh attempt superseded; discarding results");
            return RefreshOutcome::Superseded;
        }

        let signals = partial.lock().expect("signal lock").clone();
        let decision = reconcile(&signals, &prior, Utc::now());
        tracing::debug!(
            trigger,
            rule = ?decision.rule,
            status = decision.state.status.as_str(),
            "reconcile decision"
        );

        let outcome = inner.apply_decision(&prior, &signals, decision, resume, expired);
        inner.attempts.finish(token);
        outcome
    }
}

impl<B: PurchaseBridge + 'static> EngineInner<B> {
    fn current_state(&self) -> SubscriptionState {
        self.state_tx.borrow().clone()
    }

    fn publish(&self, state: SubscriptionState) {
        self.state_tx.send_replace(state);
    }

    fn max_cache_age(&self) -> Duration {
        Duration::hours(self.config.cache.max_age_hours)
    }

    /// Persist and publish a confirmed-positive purchase/restore snapshot.
    fn adopt_positive_snapshot(&self, snap: &mbk_schemas::EntitlementSnapshot) -> SubscriptionState {
        let rec = CachedEntitlement::from_snapshot(snap, Utc::now());
        if let Err(err) = self.cache.save(&rec) {
            tracing::warn!(%err, "cache save failed");
        }

        let prior = self.current_state();
        let signals = SignalSet {
            native: Some(SourceSignal::Confirmed(snap.clone())),
            ..Default::default()
        };
        let decision = reconcile(&signals, &prior, Utc::now());
        self.stabilizer.lock().expect("stabilizer lock").observe_positive();
        self.publish(decision.state.clone());
        decision.state
    }

    /// Consult live sources in fixed order: the purchase source first,
    /// the profile last, so the anti-downgrade rule can inspect earlier
    /// results. Fills `partial` as each source resolves — the watchdog
    /// may abandon this future at any await point.
    async fn gather_live_signals(&self, user_id: &str, partial: Arc<StdMutex<SignalSet>>) {
        match self.config.platform {
            Platform::Native => {
                let signal = match self.native.read(user_id).await {
                    SourceRead::Confirmed(snap) => {
                        if !snap.is_pro {
                            // Confirmed negative from an identified check:
                            // the cached positive is no longer meaningful.
                            if let Err(err) = self.cache.clear() {
                                tracing::warn!(%err, "cache clear failed");
                            }
                            partial.lock().expect("signal lock").cache = None;
                        }
                        SourceSignal::Confirmed(snap)
                    }
                    SourceRead::IdentityMismatch { expected, got } => {
                        tracing::warn!(%expected, %got, "native reading identity mismatch; clearing cache");
                        if let Err(err) = self.cache.clear() {
                            tracing::warn!(%err, "cache clear failed");
                        }
                        partial.lock().expect("signal lock").cache = None;
                        SourceSignal::unavailable("identity mismatch")
                    }
                    SourceRead::Unavailable { reason } => SourceSignal::Unavailable { reason },
                };
                partial.lock().expect("signal lock").native = Some(signal);
            }
            Platform::Web => {
                let signal = match self.auth.access_token() {
                    Some(token) => match self.gateway.read(&token, user_id).await {
                        SourceRead::Confirmed(snap) => SourceSignal::Confirmed(snap),
                        SourceRead::IdentityMismatch { .. } => {
                            SourceSignal::unavailable("identity mismatch")
                        }
                        SourceRead::Unavailable { reason } => SourceSignal::Unavailable { reason },
                    },
                    None => SourceSignal::unavailable("no access token"),
                };
                partial.lock().expect("signal lock").gateway = Some(signal);
            }
        }

        let profile = match self.auth.access_token() {
            Some(token) => match self.profile.read(&token, user_id).await {
                ProfileRead::Record(rec) => ProfileSignal::Record(rec),
                ProfileRead::Unavailable { reason } => ProfileSignal::Unavailable { reason },
            },
            None => ProfileSignal::unavailable("no access token"),
        };
        partial.lock().expect("signal lock").profile = Some(profile);
    }

    /// Turn a decision into the published state, applying the watchdog
    /// no-downgrade rule and the resume stabilizer.
    fn apply_decision(
        &self,
        prior: &SubscriptionState,
        signals: &SignalSet,
        decision: Decision,
        resume: bool,
        expired: bool,
    ) -> RefreshOutcome {
        let clean = !expired
            && !decision
                .notes
                .iter()
                .any(|n| matches!(n, DecisionNote::Unavailable { .. }));

        // Watchdog finalization never downgrades: partial data is not
        // evidence of cancellation.
        if expired && prior.is_entitled() && !decision.is_entitled() {
            self.publish(prior.with_loading(false));
            return RefreshOutcome::WatchdogExpired;
        }

        let purchase_negative = signals
            .native
            .as_ref()
            .map(SourceSignal::is_confirmed_negative)
            .unwrap_or(false)
            || signals
                .gateway
                .as_ref()
                .map(SourceSignal::is_confirmed_negative)
                .unwrap_or(false);

        if decision.is_entitled() {
            // A positive live reading resets the resume streak. Neither a
            // cache fallback nor a kept-prior inconclusive result is a
            // reading, so they leave the streak alone.
            if !matches!(
                decision.rule,
                DecisionRule::CacheFallback | DecisionRule::InconclusiveKeptPrior
            ) {
                self.stabilizer.lock().expect("stabilizer lock").observe_positive();
            }
        } else if resume && prior.is_entitled() && purchase_negative {
            let verdict = {
                let mut stab = self.stabilizer.lock().expect("stabilizer lock");
                let verdict = stab.observe_negative();
                tracing::info!(streak = stab.streak(), ?verdict, "negative resume reading");
                verdict
            };
            if verdict == StreakVerdict::SuppressDowngrade {
                self.publish(prior.with_loading(false));
                return if expired {
                    RefreshOutcome::WatchdogExpired
                } else {
                    RefreshOutcome::Completed { clean }
                };
            }
        }

        // Persist the freshest confirmed-positive purchase snapshot.
        if let Some(snap) = signals
            .native
            .as_ref()
            .and_then(SourceSignal::confirmed_positive)
            .or_else(|| signals.gateway.as_ref().and_then(SourceSignal::confirmed_positive))
        {
            let rec = CachedEntitlement::from_snapshot(snap, Utc::now());
            if let Err(err) = self.cache.save(&rec) {
                tracing::warn!(%err, "cache save failed");
            }
        }

        self.publish(decision.state);
        if expired {
            RefreshOutcome::WatchdogExpired
        } else {
            RefreshOutcome::Completed { clean }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (cross-source scenarios live in the testkit crate)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mbk_schemas::{EntitlementSnapshot, SubscriptionStatus};

    /// Bridge that fails everything; engine behavior must degrade, not break.
    struct DeadBridge;

    #[async_trait]
    impl PurchaseBridge for DeadBridge {
        async fn configure(&self, _api_key: &str) -> Result<(), SourceError> {
            Err(SourceError::Transport("no store".into()))
        }
        async fn identify(&self, _user_id: &str) -> Result<EntitlementSnapshot, SourceError> {
            Err(SourceError::Transport("no store".into()))
        }
        async fn current_entitlement(&self) -> Result<EntitlementSnapshot, SourceError> {
            Err(SourceError::Transport("no store".into()))
        }
        async fn purchase(&self, _plan_ref: &str) -> Result<EntitlementSnapshot, SourceError> {
            Err(SourceError::Transport("no store".into()))
        }
        async fn restore(&self) -> Result<EntitlementSnapshot, SourceError> {
            Err(SourceError::Transport("no store".into()))
        }
        async fn logout(&self) -> Result<(), SourceError> {
            Ok(())
        }
        async fn set_subscriber_attributes(
            &self,
            _attributes: &[(String, String)],
        ) -> Result<(), SourceError> {
            Ok(())
        }
    }

    struct StubAuth {
        user: Option<String>,
    }

    impl AuthSession for StubAuth {
        fn user_id(&self) -> Option<String> {
            self.user.clone()
        }
        fn access_token(&self) -> Option<String> {
            self.user.as_ref().map(|u| format!("tok-{u}"))
        }
    }

    fn engine_with(
        dir: &tempfile::TempDir,
        user: Option<&str>,
    ) -> EntitlementEngine<DeadBridge> {
        let mut config = EngineConfig::default();
        config.cache.path = dir
            .path()
            .join("entitlement.json")
            .to_string_lossy()
            .into_owned();
        EntitlementEngine::new(
            config,
            Arc::new(DeadBridge),
            Arc::new(StubAuth {
                user: user.map(str::to_string),
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn initial_state_is_loading_and_not_entitled() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(&dir, None);
        let state = engine.state();
        assert!(state.is_loading);
        assert!(!state.is_entitled());
        assert!(!engine.can_perform_gated_action());
    }

    #[tokio::test]
    async fn refresh_without_session_publishes_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(&dir, None);
        let outcome = engine.refresh("boot").await;
        assert_eq!(outcome, RefreshOutcome::SignedOut);
        assert_eq!(engine.state(), SubscriptionState::signed_out());
    }

    #[tokio::test]
    async fn refresh_with_dead_sources_is_unclean_but_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(&dir, Some("user-1"));
        let outcome = engine.refresh("boot").await;
        assert_eq!(outcome, RefreshOutcome::Completed { clean: false });
        let state = engine.state();
        assert_eq!(state.status, SubscriptionStatus::None);
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn fresh_cache_record_carries_a_dead_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(&dir, Some("user-1"));

        let snap = EntitlementSnapshot::positive("user-1", false, None, None, Utc::now());
        EntitlementCache::new(dir.path().join("entitlement.json"))
            .save(&CachedEntitlement::from_snapshot(&snap, Utc::now()))
            .unwrap();

        let outcome = engine.refresh("boot").await;
        assert_eq!(outcome, RefreshOutcome::Completed { clean: false });
        assert!(engine.can_perform_gated_action());
        assert_eq!(
            engine.state().provider,
            Some(mbk_schemas::EntitlementProvider::Cache)
        );
    }

    #[tokio::test]
    async fn subscribers_observe_published_states() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(&dir, Some("user-1"));
        let mut rx = engine.subscribe();
        assert!(rx.borrow().is_loading);

        engine.refresh("boot").await;
        let final_state = rx.borrow_and_update().clone();
        assert!(!final_state.is_loading);
    }

    #[tokio::test]
    async fn sign_out_clears_cache_and_publishes_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(&dir, Some("user-1"));

        let cache = EntitlementCache::new(dir.path().join("entitlement.json"));
        let snap = EntitlementSnapshot::positive("user-1", false, None, None, Utc::now());
        cache
            .save(&CachedEntitlement::from_snapshot(&snap, Utc::now()))
            .unwrap();

        engine.on_auth_signed_out().await.unwrap();
        assert_eq!(engine.state(), SubscriptionState::signed_out());
        assert_eq!(
            cache.load("user-1", Utc::now(), mbk_cache::default_max_cache_age()),
            CacheLookup::Missing
        );
    }
}
