//! Scenario: the dev-only mock override (testkit builds) forces a state
//! for UI testing. While it is set, refreshes are no-ops and make no
//! source calls; releasing it returns control to the real pipeline.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use httpmock::prelude::*;
use mbk_engine::{EntitlementEngine, RefreshOutcome};
use mbk_schemas::{
    EntitlementProvider, PlanType, SubscriptionState, SubscriptionStatus,
};
use mbk_testkit::{test_config, BridgeRead, FixedAuth, MockBridge};

#[tokio::test]
async fn scenario_mock_override_bypasses_sources() {
    let dir = tempfile::tempdir().unwrap();
    let profile = MockServer::start_async().await;
    profile
        .mock_async(|when, then| {
            when.method(GET).path("/v1/profiles/user-1/subscription");
            then.status(200).json_body(serde_json::json!({
                "subscription_status": "none",
                "subscription_type": null,
                "subscription_end_date": null,
                "trial_end_date": null,
                "lifetime_access": false,
                "promotional_access_end": null
            }));
        })
        .await;

    let bridge = Arc::new(MockBridge::new());
    bridge.set_fallback(BridgeRead::NotPro);

    let engine = EntitlementEngine::new(
        test_config(&dir.path().join("entitlement.json"), &profile.base_url()),
        Arc::clone(&bridge),
        Arc::new(FixedAuth::signed_in("user-1")),
    )
    .unwrap();
    engine.on_auth_signed_in("user-1").await.unwrap();
    assert_eq!(engine.state().status, SubscriptionStatus::None);

    let mocked = SubscriptionState {
        status: SubscriptionStatus::Active,
        plan_type: Some(PlanType::Annual),
        period_end_date: None,
        provider: Some(EntitlementProvider::Native),
        is_loading: false,
    };
    engine.set_mock_state(Some(mocked.clone()));
    assert_eq!(engine.state(), mocked);
    assert!(engine.can_perform_gated_action());

    // Refreshes are no-ops while the override is active.
    let reads_before = bridge.read_calls.load(Ordering::SeqCst);
    let outcome = engine.refresh("interval").await;
    assert_eq!(outcome, RefreshOutcome::Completed { clean: true });
    assert_eq!(bridge.read_calls.load(Ordering::SeqCst), reads_before);
    assert_eq!(engine.state(), mocked);

    // Releasing the override hands control back to the real pipeline.
    engine.set_mock_state(None);
    engine.refresh("interval").await;
    assert_eq!(engine.state().status, SubscriptionStatus::None);
    assert!(!engine.can_perform_gated_action());
}
