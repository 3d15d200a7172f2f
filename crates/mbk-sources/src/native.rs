//! Native purchase adapter: gates every bridge reading behind the
//! configure + identify sequence and screens readings for identity
//! mismatches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::{PurchaseBridge, SourceError, SourceRead};
use mbk_schemas::EntitlementSnapshot;

/// Wrapper around a [`PurchaseBridge`] that enforces the trust rules:
///
/// - no reading is produced before `configure` + `identify` have succeeded
///   for the asked-about user (an unidentified bridge may still be bound
///   to a previously-active device user),
/// - a reading whose subject differs from the asked-about user is reported
///   as [`SourceRead::IdentityMismatch`], never as a confirmed signal.
pub struct NativeSource<B: PurchaseBridge + 'static> {
    bridge: Arc<B>,
    configured: AtomicBool,
    identified_user: Mutex<Option<String>>,
}

impl<B: PurchaseBridge + 'static> NativeSource<B> {
    pub fn new(bridge: Arc<B>) -> Self {
        Self {
            bridge,
            configured: AtomicBool::new(false),
            identified_user: Mutex::new(None),
        }
    }

    /// The user the bridge is currently identified as, if any.
    pub fn identified_user(&self) -> Option<String> {
        self.identified_user.lock().expect("identify lock").clone()
    }

    fn set_identified_user(&self, user_id: Option<String>) {
        *self.identified_user.lock().expect("identify lock") = user_id;
    }

    /// One-time per-process SDK configuration. Later calls are no-ops.
    pub async fn ensure_configured(&self, api_key: &str) -> Result<(), SourceError> {
        if self.configured.load(Ordering::Acquire) {
            return Ok(());
        }
        self.bridge.configure(api_key).await?;
        self.configured.store(true, Ordering::Release);
        Ok(())
    }

    /// Bind the bridge to `user_id`.
    ///
    /// On success the adapter pushes `attributes` to the purchase backend
    /// on a detached task — enrichment is best-effort and must never block
    /// or fail entitlement determination.
    pub async fn identify(
        &self,
        user_id: &str,
        attributes: Vec<(String, String)>,
    ) -> SourceRead {
        if !self.configured.load(Ordering::Acquire) {
            return SourceRead::unavailable("bridge not configured");
        }

        match self.bridge.identify(user_id).await {
            Ok(snapshot) => {
                if snapshot.user_id != user_id {
                    tracing::warn!(
                        expected = %user_id,
                        got = %snapshot.user_id,
                        "identify returned a different subscriber"
                    );
                    return SourceRead::IdentityMismatch {
                        expected: user_id.to_string(),
                        got: snapshot.user_id,
                    };
                }

                self.set_identified_user(Some(user_id.to_string()));

                if !attributes.is_empty() {
                    let bridge = Arc::clone(&self.bridge);
                    tokio::spawn(async move {
                        if let Err(err) = bridge.set_subscriber_attributes(&attributes).await {
                            tracing::debug!(%err, "subscriber attribute enrichment failed");
                        }
                    });
                }

                SourceRead::Confirmed(snapshot)
            }
            Err(err) => {
                tracing::debug!(%err, "identify failed");
                SourceRead::unavailable(err.to_string())
            }
        }
    }

    /// Read the identified user's current entitlement.
    ///
    /// Readings taken before identification are discarded: the bridge may
    /// still report whoever used the device last.
    pub async fn read(&self, user_id: &str) -> SourceRead {
        match self.identified_user() {
            Some(identified) if identified == user_id => {}
            _ => return SourceRead::unavailable(SourceError::NotIdentified.to_string()),
        }

        match self.bridge.current_entitlement().await {
            Ok(snapshot) => {
                if snapshot.user_id != user_id {
                    return SourceRead::IdentityMismatch {
                        expected: user_id.to_string(),
                        got: snapshot.user_id,
                    };
                }
                SourceRead::Confirmed(snapshot)
            }
            Err(err) => {
                tracing::debug!(%err, "native entitlement read failed");
                SourceRead::unavailable(err.to_string())
            }
        }
    }

    /// Run the purchase flow. Requires prior identification.
    pub async fn purchase(&self, plan_ref: &str) -> Result<EntitlementSnapshot, SourceError> {
        if self.identified_user().is_none() {
            return Err(SourceError::NotIdentified);
        }
        self.bridge.purchase(plan_ref).await
    }

    /// Replay historical purchases. Requires prior identification.
    pub async fn restore(&self) -> Result<EntitlementSnapshot, SourceError> {
        if self.identified_user().is_none() {
            return Err(SourceError::NotIdentified);
        }
        self.bridge.restore().await
    }

    /// Reset the bridge to anonymous. The identified user is forgotten
    /// even if the bridge call fails.
    pub async fn logout(&self) -> Result<(), SourceError> {
        self.set_identified_user(None);
        self.bridge.logout().await
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
