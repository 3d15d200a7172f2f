//! Scenario: the store reports a trialing entitlement with an expiry —
//! the published state maps status/period/provider, and the persistent
//! cache now holds a matching positive record.

use std::sync::Arc;

use chrono::{Duration, Utc};
use httpmock::prelude::*;
use mbk_cache::{default_max_cache_age, EntitlementCache};
use mbk_engine::EntitlementEngine;
use mbk_schemas::{EntitlementProvider, PlanType, SubscriptionStatus};
use mbk_testkit::{test_config, BridgeRead, FixedAuth, MockBridge};

#[tokio::test]
async fn scenario_trialing_entitlement_reaches_state_and_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("entitlement.json");
    let profile = MockServer::start_async().await;
    profile
        .mock_async(|when, then| {
            when.method(GET).path("/v1/profiles/user-1/subscription");
            then.status(200).json_body(serde_json::json!({
                "subscription_status": "trialing",
                "subscription_type": "monthly",
                "subscription_end_date": null,
                "trial_end_date": null,
                "lifetime_access": false,
                "promotional_access_end": null
            }));
        })
        .await;

    let expires = Utc::now() + Duration::days(7);
    let bridge = Arc::new(MockBridge::new());
    bridge.set_fallback(BridgeRead::Pro {
        trialing: true,
        plan: Some(PlanType::Monthly),
        expires: Some(expires),
    });

    let engine = EntitlementEngine::new(
        test_config(&cache_path, &profile.base_url()),
        bridge,
        Arc::new(FixedAuth::signed_in("user-1")),
    )
    .unwrap();
    engine.on_auth_signed_in("user-1").await.unwrap();

    let state = engine.state();
    assert_eq!(state.status, SubscriptionStatus::Trialing);
    assert_eq!(state.plan_type, Some(PlanType::Monthly));
    assert_eq!(state.period_end_date, Some(expires));
    assert_eq!(state.provider, Some(EntitlementProvider::Native));
    assert!(engine.can_perform_gated_action());

    // The cache was promoted from the same snapshot.
    let rec = EntitlementCache::new(&cache_path)
        .load("user-1", Utc::now(), default_max_cache_age())
        .fresh()
        .expect("cache must hold a fresh positive record");
    assert!(rec.is_pro);
    assert!(rec.is_trialing);
    assert_eq!(rec.plan_type, Some(PlanType::Monthly));
    assert_eq!(rec.expiration_date, Some(expires));
}
