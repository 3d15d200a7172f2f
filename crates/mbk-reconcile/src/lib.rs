//! mbk-reconcile
//!
//! The precedence engine that folds source signals into one authoritative
//! [`mbk_schemas::SubscriptionState`].
//!
//! Architectural decisions:
//! - Out-of-band grants (lifetime, promotional) outrank every purchase source
//! - A confirmed-positive purchase signal outranks the profile record
//! - A lagging profile `none` never overwrites a same-refresh positive
//! - An inconclusive refresh never downgrades a previously entitled state
//!
//! Deterministic, pure logic. No IO. No clock reads — callers pass `now`.

mod engine;
mod types;

pub use engine::reconcile;
pub use types::*;
