//! mbk-engine
//!
//! The runtime half of the entitlement system: one owned engine instance
//! that serializes refresh attempts, bounds them with a watchdog, folds
//! adapter signals through the reconciler, and broadcasts the single
//! authoritative subscription state to every consumer.
//!
//! Host apps construct an [`EntitlementEngine`] with their purchase-bridge
//! and auth wiring, call the lifecycle hooks ([`EntitlementEngine::on_app_foreground`],
//! [`EntitlementEngine::on_auth_signed_in`], [`EntitlementEngine::on_auth_signed_out`]),
//! and gate features on [`EntitlementEngine::can_perform_gated_action`].

mod coordinator;
mod engine;
mod stabilizer;

pub use coordinator::{AttemptSlot, PurchaseOutcome, RefreshAttempt, RefreshOutcome};
pub use engine::{AuthSession, EntitlementEngine};
pub use stabilizer::{ResumeStabilizer, StreakVerdict};
