//! Scenario: the store confirms entitlement while the backend profile
//! still says `none` (webhook delay). The purchase signal must win — the
//! published status is the positive one, never `none`.

use std::sync::Arc;

use httpmock::prelude::*;
use mbk_engine::{EntitlementEngine, RefreshOutcome};
use mbk_schemas::{EntitlementProvider, PlanType, SubscriptionStatus};
use mbk_testkit::{test_config, BridgeRead, FixedAuth, MockBridge};

async fn lagging_profile(server: &MockServer) {
    server
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
}

#[tokio::test]
async fn scenario_native_positive_beats_lagging_profile_none() {
    let dir = tempfile::tempdir().unwrap();
    let profile = MockServer::start_async().await;
    lagging_profile(&profile).await;

    let bridge = Arc::new(MockBridge::new());
    bridge.set_fallback(BridgeRead::Pro {
        trialing: false,
        plan: Some(PlanType::Annual),
        expires: None,
    });

    let engine = EntitlementEngine::new(
        test_config(&dir.path().join("entitlement.json"), &profile.base_url()),
        bridge,
        Arc::new(FixedAuth::signed_in("user-1")),
    )
    .unwrap();
    let outcome = engine.on_auth_signed_in("user-1").await.unwrap();
    assert_eq!(outcome, RefreshOutcome::Completed { clean: true });

    let state = engine.state();
    assert_eq!(state.status, SubscriptionStatus::Active);
    assert_eq!(state.provider, Some(EntitlementProvider::Native));
    assert_eq!(state.plan_type, Some(PlanType::Annual));
}

#[tokio::test]
async fn scenario_repeated_refreshes_stay_positive_while_profile_lags() {
    let dir = tempfile::tempdir().unwrap();
    let profile = MockServer::start_async().await;
    lagging_profile(&profile).await;

    let bridge = Arc::new(MockBridge::new());
    bridge.set_fallback(BridgeRead::Pro {
        trialing: false,
        plan: Some(PlanType::Monthly),
        expires: None,
    });

    let engine = EntitlementEngine::new(
        test_config(&dir.path().join("entitlement.json"), &profile.base_url()),
        bridge,
        Arc::new(FixedAuth::signed_in("user-1")),
    )
    .unwrap();
    engine.on_auth_signed_in("user-1").await.unwrap();

    // However long the webhook lags, no refresh flickers to none.
    for _ in 0..3 {
        engine.refresh("interval").await;
        assert_eq!(engine.state().status, SubscriptionStatus::Active);
    }
}
