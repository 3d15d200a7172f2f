//! `mbk simulate` — drive the real engine against scripted sources and
//! print every decision it publishes. The developer-facing stand-in for
//! poking at a device build's subscription diagnostics screen.

use anyhow::{bail, Result};
use chrono::{Duration, Utc};
use std::sync::Arc;

use mbk_engine::EntitlementEngine;
use mbk_schemas::{PlanType, SubscriptionState};
use mbk_testkit::{test_config, BridgeRead, FixedAuth, MockBridge};

const SCENARIOS: &str = "trial | active | lifetime | flicker | outage";

pub async fn run(scenario: &str) -> Result<()> {
    let cache_path = std::env::temp_dir().join(format!("mbk-simulate-{}.json", std::process::id()));
    // Each run starts clean.
    let _ = std::fs::remove_file(&cache_path);

    let bridge = Arc::new(MockBridge::new());
    let auth = Arc::new(FixedAuth::signed_in("sim-user"));
    let engine = EntitlementEngine::new(
        test_config(&cache_path, "http://127.0.0.1:1"),
        Arc::clone(&bridge),
        auth,
    )?;

    match scenario {
        "trial" => {
            bridge.set_fallback(BridgeRead::Pro {
                trialing: true,
                plan: Some(PlanType::Monthly),
                expires: Some(Utc::now() + Duration::days(7)),
            });
            step(&engine, "sign-in with an active trial").await?;
        }
        "active" => {
            bridge.set_fallback(BridgeRead::Pro {
                trialing: false,
                plan: Some(PlanType::Annual),
                expires: Some(Utc::now() + Duration::days(300)),
            });
            step(&engine, "sign-in with a paid subscription").await?;
        }
        "lifetime" => {
            // The profile backend is unreachable in simulation, so the
            // grant is injected as a store reading instead.
            bridge.set_fallback(BridgeRead::Pro {
                trialing: false,
                plan: None,
                expires: None,
            });
            step(&engine, "sign-in with an untyped grant").await?;
        }
        "flicker" => {
            bridge.set_fallback(BridgeRead::Pro {
                trialing: false,
                plan: Some(PlanType::Monthly),
                expires: None,
            });
            step(&engine, "sign-in with a paid subscription").await?;

            bridge.set_fallback(BridgeRead::NotPro);
            resume(&engine, "resume #1: store reports not entitled").await?;
            resume(&engine, "resume #2: store reports not entitled again").await?;
        }
        "outage" => {
            bridge.set_fallback(BridgeRead::Pro {
                trialing: false,
                plan: Some(PlanType::Monthly),
                expires: None,
            });
            step(&engine, "sign-in with a paid subscription").await?;

            bridge.set_fallback(BridgeRead::Fail("store unreachable".into()));
            resume(&engine, "resume during a store outage").await?;
        }
        other => bail!("unknown scenario '{other}'. expected one of: {SCENARIOS}"),
    }

    let _ = std::fs::remove_file(&cache_path);
    Ok(())
}

async fn step(engine: &EntitlementEngine<MockBridge>, label: &str) -> Result<()> {
    println!("== {label}");
    let outcome = engine.on_auth_signed_in("sim-user").await?;
    print_state("outcome", &format!("{outcome:?}"), &engine.state());
    Ok(())
}

async fn resume(engine: &EntitlementEngine<MockBridge>, label: &str) -> Result<()> {
    println!("== {label}");
    if let Some(verify) = engine.on_app_foreground().await {
        let outcome = verify.await?;
        print_state("outcome", &format!("{outcome:?}"), &engine.state());
        println!("   negative streak: {}", engine.negative_streak());
    }
    Ok(())
}

fn print_state(key: &str, outcome: &str, state: &SubscriptionState) {
    println!("   {key}: {outcome}");
    println!(
        "   state: status={} plan={} provider={} loading={}",
        state.status.as_str(),
        state
            .plan_type
            .map(|p| p.as_str())
            .unwrap_or("-"),
        state
            .provider
            .map(|p| p.as_str())
            .unwrap_or("-"),
        state.is_loading
    );
}
