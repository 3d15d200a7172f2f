//! Scenario: every source hangs indefinitely. The refresh must still
//! resolve within the watchdog bound, leave `is_loading` false, and keep
//! the best-known state rather than downgrading on missing evidence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use httpmock::prelude::*;
use mbk_engine::{EntitlementEngine, RefreshOutcome};
use mbk_schemas::{PlanType, SubscriptionStatus};
use mbk_testkit::{test_config, BridgeRead, FixedAuth, MockBridge};

async fn signed_in_engine(
    dir: &tempfile::TempDir,
    profile: &MockServer,
    fallback: BridgeRead,
) -> (EntitlementEngine<MockBridge>, Arc<MockBridge>) {
    profile
        .mock_async(|when, then| {
            when.method(GET).path("/v1/profiles/user-1/subscription");
            then.status(503);
        })
        .await;

    let bridge = Arc::new(MockBridge::new());
    bridge.set_fallback(fallback);

    let engine = EntitlementEngine::new(
        test_config(&dir.path().join("entitlement.json"), &profile.base_url()),
        Arc::clone(&bridge),
        Arc::new(FixedAuth::signed_in("user-1")),
    )
    .unwrap();
    engine.on_auth_signed_in("user-1").await.unwrap();
    (engine, bridge)
}

#[tokio::test]
async fn scenario_watchdog_resolves_hung_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let profile = MockServer::start_async().await;
    let (engine, bridge) = signed_in_engine(&dir, &profile, BridgeRead::NotPro).await;
    assert_eq!(engine.state().status, SubscriptionStatus::None);

    // Every store call hangs from here on.
    bridge.set_fallback(BridgeRead::Hang);

    let started = Instant::now();
    let outcome = engine.refresh("interval").await;
    let elapsed = started.elapsed();

    assert_eq!(outcome, RefreshOutcome::WatchdogExpired);
    assert!(
        elapsed < Duration::from_secs(3),
        "refresh must resolve near the 1s watchdog, took {elapsed:?}"
    );
    let state = engine.state();
    assert!(!state.is_loading, "watchdog must force is_loading off");
    assert_eq!(state.status, SubscriptionStatus::None);
}

#[tokio::test]
async fn scenario_watchdog_keeps_best_known_entitlement() {
    let dir = tempfile::tempdir().unwrap();
    let profile = MockServer::start_async().await;
    let (engine, bridge) = signed_in_engine(
        &dir,
        &profile,
        BridgeRead::Pro {
            trialing: false,
            plan: Some(PlanType::Monthly),
            expires: None,
        },
    )
    .await;
    assert_eq!(engine.state().status, SubscriptionStatus::Active);

    // Everything hangs from here on.
    bridge.set_fallback(BridgeRead::Hang);

    let outcome = engine.refresh("interval").await;
    assert_eq!(outcome, RefreshOutcome::WatchdogExpired);

    let state = engine.state();
    assert_eq!(state.status, SubscriptionStatus::Active, "no downgrade on partial data");
    assert!(!state.is_loading);
}

#[tokio::test]
async fn scenario_hung_identify_does_not_stall_sign_in() {
    let dir = tempfile::tempdir().unwrap();
    let profile = MockServer::start_async().await;
    profile
        .mock_async(|when, then| {
            when.method(GET).path("/v1/profiles/user-1/subscription");
            then.status(503);
        })
        .await;

    let bridge = Arc::new(MockBridge::new());
    bridge.set_fallback(BridgeRead::Hang);

    let engine = EntitlementEngine::new(
        test_config(&dir.path().join("entitlement.json"), &profile.base_url()),
        Arc::clone(&bridge),
        Arc::new(FixedAuth::signed_in("user-1")),
    )
    .unwrap();

    // identify hangs, the refresh behind it cannot read the bridge —
    // the sign-in pipeline must still resolve in bounded time.
    let started = Instant::now();
    let outcome = engine.on_auth_signed_in("user-1").await.unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(4),
        "sign-in pipeline must be watchdog-bounded"
    );
    assert!(matches!(
        outcome,
        RefreshOutcome::Completed { clean: false }
    ));
    assert!(!engine.state().is_loading);
}
