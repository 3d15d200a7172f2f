//! Purchase-bridge boundary.
//!
//! This trait is the full surface the engine needs from an on-device
//! purchase SDK. Implementations live in the host app (one per platform
//! shell); the engine and tests program against the trait only.
//!
//! Implementations must be `Send + Sync` so the engine can share them
//! across spawned tasks.

use async_trait::async_trait;

use crate::SourceError;
use mbk_schemas::EntitlementSnapshot;

/// Contract of the on-device purchase SDK.
///
/// # Ordering requirements
///
/// `configure` must be called once per process before anything else.
/// `identify` must be called for the signed-in user before entitlement
/// readings can be trusted; [`crate::NativeSource`] enforces both and
/// discards readings taken out of order.
///
/// # Cancellation
///
/// `purchase` and `restore` distinguish the user dismissing the sheet
/// ([`SourceError::Cancelled`]) from genuine failures; callers surface the
/// former as a normal outcome, never as an error.
#[async_trait]
pub trait PurchaseBridge: Send + Sync {
    /// One-time per-process SDK initialization.
    async fn configure(&self, api_key: &str) -> Result<(), SourceError>;

    /// Bind the bridge to `user_id` and return that user's entitlement.
    async fn identify(&self, user_id: &str) -> Result<EntitlementSnapshot, SourceError>;

    /// Current entitlement of the identified user.
    async fn current_entitlement(&self) -> Result<EntitlementSnapshot, SourceError>;

    /// Run the purchase flow for `plan_ref` and return the resulting
    /// entitlement.
    async fn purchase(&self, plan_ref: &str) -> Result<EntitlementSnapshot, SourceError>;

    /// Replay historical purchases against the store account.
    async fn restore(&self) -> Result<EntitlementSnapshot, SourceError>;

    /// Reset the bridge to its anonymous state.
    async fn logout(&self) -> Result<(), SourceError>;

    /// Attach non-entitlement metadata (display name, cohort attributes)
    /// to the purchase-backend subscriber. Best-effort; callers fire and
    /// forget.
    async fn set_subscriber_attributes(
        &self,
        attributes: &[(String, String)],
    ) -> Result<(), SourceError>;
}
