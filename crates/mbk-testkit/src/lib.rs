//! mbk-testkit
//!
//! Scriptable test doubles for the entitlement engine plus the
//! cross-crate scenario tests under `tests/`. Nothing here ships in
//! production builds; host apps wire real bridge/auth implementations.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mbk_config::{EngineConfig, Platform};
use mbk_engine::AuthSession;
use mbk_schemas::{EntitlementSnapshot, PlanType};
use mbk_sources::{PurchaseBridge, SourceError};

// ---------------------------------------------------------------------------
// MockBridge
// ---------------------------------------------------------------------------

/// One scripted entitlement reading.
#[derive(Debug, Clone)]
pub enum BridgeRead {
    /// Entitled reading.
    Pro {
        trialing: bool,
        plan: Option<PlanType>,
        expires: Option<DateTime<Utc>>,
    },
    /// Confirmed "not entitled".
    NotPro,
    /// Bridge error (maps to an unavailable source).
    Fail(String),
    /// Never resolves within any reasonable watchdog.
    Hang,
}

#[derive(Debug)]
struct BridgeState {
    /// Subject the store reports. `None` follows whoever identified last;
    /// `Some` simulates a sandboxed identity leak from a previous device
    /// user.
    subscriber_override: Option<String>,
    /// Who the bridge believes is logged in.
    logged_in: Option<String>,
    /// Readings consumed one per `current_entitlement` call.
    script: VecDeque<BridgeRead>,
    /// Used when the script runs dry, and by `identify`/`restore`.
    fallback: BridgeRead,
    /// Result of the next `purchase` call.
    purchase: Result<BridgeRead, SimulatedDecline>,
}

#[derive(Debug, Clone, Copy)]
pub enum SimulatedDecline {
    Cancelled,
    StoreError,
}

/// Scriptable in-process purchase bridge.
///
/// Call counters let scenario tests assert exactly how many store calls a
/// refresh made (mutual exclusion, discarded attempts).
pub struct MockBridge {
    state: Mutex<BridgeState>,
    pub configure_calls: AtomicU32,
    pub identify_calls: AtomicU32,
    pub read_calls: AtomicU32,
    pub restore_calls: AtomicU32,
    pub logout_calls: AtomicU32,
    pub attribute_calls: AtomicU32,
}

impl Default for MockBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBridge {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BridgeState {
                subscriber_override: None,
                logged_in: None,
                script: VecDeque::new(),
                fallback: BridgeRead::NotPro,
                purchase: Err(SimulatedDecline::Cancelled),
            }),
            configure_calls: AtomicU32::new(0),
            identify_calls: AtomicU32::new(0),
            read_calls: AtomicU32::new(0),
            restore_calls: AtomicU32::new(0),
            logout_calls: AtomicU32::new(0),
            attribute_calls: AtomicU32::new(0),
        }
    }

    /// Baseline reading used when the script is empty.
    pub fn set_fallback(&self, read: BridgeRead) {
        self.state.lock().unwrap().fallback = read;
    }

    /// Queue readings consumed one per entitlement read.
    pub fn push_reads(&self, reads: impl IntoIterator<Item = BridgeRead>) {
        self.state.lock().unwrap().script.extend(reads);
    }

    /// Make the store report `subscriber` regardless of who identified.
    pub fn leak_identity(&self, subscriber: &str) {
        self.state.lock().unwrap().subscriber_override = Some(subscriber.to_string());
    }

    pub fn set_purchase_result(&self, result: Result<BridgeRead, SimulatedDecline>) {
        self.state.lock().unwrap().purchase = result;
    }

    fn subject(&self, state: &BridgeState, fallback_user: &str) -> String {
        state
            .subscriber_override
            .clone()
            .or_else(|| state.logged_in.clone())
            .unwrap_or_else(|| fallback_user.to_string())
    }

    fn materialize(
        &self,
        read: &BridgeRead,
        subject: &str,
    ) -> Option<Result<EntitlementSnapshot, SourceError>> {
        match read {
            BridgeRead::Pro {
                trialing,
                plan,
                expires,
            } => Some(Ok(EntitlementSnapshot::positive(
                subject, *trialing, *plan, *expires, Utc::now(),
            ))),
            BridgeRead::NotPro => Some(Ok(EntitlementSnapshot::negative(subject, Utc::now()))),
            BridgeRead::Fail(reason) => Some(Err(SourceError::Transport(reason.clone()))),
            BridgeRead::Hang => None,
        }
    }

    async fn resolve(
        &self,
        read: BridgeRead,
        subject: String,
    ) -> Result<EntitlementSnapshot, SourceError> {
        match self.materialize(&read, &subject) {
            Some(result) => result,
            None => {
                // Hang: outlive any test watchdog.
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(SourceError::Transport("unreachable".into()))
            }
        }
    }
}

#[async_trait]
impl PurchaseBridge for MockBridge {
    async fn configure(&self, _api_key: &str) -> Result<(), SourceError> {
        self.configure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn identify(&self, user_id: &str) -> Result<EntitlementSnapshot, SourceError> {
        self.identify_calls.fetch_add(1, Ordering::SeqCst);
        let (read, subject) = {
            let mut state = self.state.lock().unwrap();
            state.logged_in = Some(user_id.to_string());
            (state.fallback.clone(), self.subject(&state, user_id))
        };
        self.resolve(read, subject).await
    }

    async fn current_entitlement(&self) -> Result<EntitlementSnapshot, SourceError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let (read, subject) = {
            let mut state = self.state.lock().unwrap();
            let read = state.script.pop_front().unwrap_or(state.fallback.clone());
            (read, self.subject(&state, "anonymous"))
        };
        self.resolve(read, subject).await
    }

    async fn purchase(&self, _plan_ref: &str) -> Result<EntitlementSnapshot, SourceError> {
        let (result, subject) = {
            let state = self.state.lock().unwrap();
            (state.purchase.clone(), self.subject(&state, "anonymous"))
        };
        match result {
            Ok(read) => self.resolve(read, subject).await,
            Err(SimulatedDecline::Cancelled) => Err(SourceError::Cancelled),
            Err(SimulatedDecline::StoreError) => {
                Err(SourceError::Transport("store unavailable".into()))
            }
        }
    }

    async fn restore(&self) -> Result<EntitlementSnapshot, SourceError> {
        self.restore_calls.fetch_add(1, Ordering::SeqCst);
        let (read, subject) = {
            let state = self.state.lock().unwrap();
            (state.fallback.clone(), self.subject(&state, "anonymous"))
        };
        self.resolve(read, subject).await
    }

    async fn logout(&self) -> Result<(), SourceError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().logged_in = None;
        Ok(())
    }

    async fn set_subscriber_attributes(
        &self,
        _attributes: &[(String, String)],
    ) -> Result<(), SourceError> {
        self.attribute_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FixedAuth
// ---------------------------------------------------------------------------

/// Auth stub with a settable current user. The access token is derived
/// from the user id (`tok-<user>`), matching what the scenario tests'
/// mock servers expect.
#[derive(Default)]
pub struct FixedAuth {
    user: Mutex<Option<String>>,
    attributes: Mutex<Vec<(String, String)>>,
}

impl FixedAuth {
    pub fn signed_in(user_id: &str) -> Self {
        Self {
            user: Mutex::new(Some(user_id.to_string())),
            attributes: Mutex::new(Vec::new()),
        }
    }

    pub fn sign_in(&self, user_id: &str) {
        *self.user.lock().unwrap() = Some(user_id.to_string());
    }

    pub fn sign_out(&self) {
        *self.user.lock().unwrap() = None;
    }

    pub fn set_attributes(&self, attributes: Vec<(String, String)>) {
        *self.attributes.lock().unwrap() = attributes;
    }
}

impl AuthSession for FixedAuth {
    fn user_id(&self) -> Option<String> {
        self.user.lock().unwrap().clone()
    }

    fn access_token(&self) -> Option<String> {
        self.user.lock().unwrap().as_ref().map(|u| format!("tok-{u}"))
    }

    fn subscriber_attributes(&self) -> Vec<(String, String)> {
        self.attributes.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Config helper
// ---------------------------------------------------------------------------

/// Engine config tuned for scenario tests: tight watchdog, single retry,
/// cache in a scratch directory.
pub fn test_config(cache_path: &std::path::Path, profile_base_url: &str) -> EngineConfig {
    // The engine resolves the purchase key from the environment at
    // construction; point it at a test-scoped variable and provide one.
    std::env::set_var("MBK_TEST_PURCHASES_API_KEY", "test_public_key");

    let mut config = EngineConfig::default();
    config.platform = Platform::Native;
    config.native.api_key_env = "MBK_TEST_PURCHASES_API_KEY".to_string();
    config.profile.base_url = profile_base_url.to_string();
    config.profile.timeout_ms = 500;
    config.gateway.timeout_ms = 500;
    config.gateway.retry_max_attempts = 1;
    config.gateway.retry_delay_ms = 10;
    config.refresh.watchdog_secs = 1;
    config.cache.path = cache_path.to_string_lossy().into_owned();
    config
}

/// Web-platform variant of [`test_config`].
pub fn test_config_web(
    cache_path: &std::path::Path,
    gateway_base_url: &str,
    profile_base_url: &str,
) -> EngineConfig {
    let mut config = test_config(cache_path, profile_base_url);
    config.platform = Platform::Web;
    config.gateway.base_url = gateway_base_url.to_string();
    config
}
