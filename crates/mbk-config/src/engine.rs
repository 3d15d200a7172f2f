//! Typed view of the merged configuration document.
//!
//! Every field here must have a counterpart in
//! [`crate::KNOWN_LEAF_POINTERS`]; the unknown-key lint keeps the two in
//! sync from the other direction.

use anyhow::{bail, Result};
use serde::Deserialize;
use std::time::Duration;

/// Which purchase path this build of the host app has available.
///
/// `Native` consults the on-device purchase bridge and skips the gateway;
/// `Web` has no purchase bridge and consults the gateway instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Native,
    Web,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub platform: Platform,
    pub native: NativeSection,
    pub gateway: GatewaySection,
    pub profile: ProfileSection,
    pub refresh: RefreshSection,
    pub cache: CacheSection,
    pub stabilizer: StabilizerSection,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Native,
            native: NativeSection::default(),
            gateway: GatewaySection::default(),
            profile: ProfileSection::default(),
            refresh: RefreshSection::default(),
            cache: CacheSection::default(),
            stabilizer: StabilizerSection::default(),
        }
    }
}

impl EngineConfig {
    /// Structural sanity checks beyond what serde can express.
    pub fn validate(&self) -> Result<()> {
        if self.refresh.watchdog_secs == 0 {
            bail!("refresh.watchdog_secs must be at least 1");
        }
        if self.refresh.watchdog_secs > 9 {
            // The watchdog exists so the UI is never stuck behind one hung
            // adapter call; tens of seconds defeats that.
            bail!("refresh.watchdog_secs must stay single-digit");
        }
        if self.gateway.retry_max_attempts == 0 {
            bail!("gateway.retry_max_attempts must be at least 1");
        }
        if self.platform == Platform::Web && self.gateway.base_url.is_empty() {
            bail!("gateway.base_url is required on the web platform");
        }
        if self.stabilizer.negative_streak_threshold == 0 {
            bail!("stabilizer.negative_streak_threshold must be at least 1");
        }
        if self.stabilizer.negative_streak_cap < self.stabilizer.negative_streak_threshold {
            bail!("stabilizer.negative_streak_cap must be >= the threshold");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NativeSection {
    /// Name of the environment variable holding the purchase-SDK public
    /// API key. The key itself never appears in config files.
    pub api_key_env: String,
}

impl Default for NativeSection {
    fn default() -> Self {
        Self {
            api_key_env: "MEMBERKIT_PURCHASES_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    pub base_url: String,
    pub timeout_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: 8_000,
            retry_max_attempts: 2,
            retry_delay_ms: 250,
        }
    }
}

impl GatewaySection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProfileSection {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for ProfileSection {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: 8_000,
        }
    }
}

impl ProfileSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshSection {
    pub watchdog_secs: u64,
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self { watchdog_secs: 8 }
    }
}

impl RefreshSection {
    pub fn watchdog(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Cache file location. Relative paths resolve against the host app's
    /// data directory.
    pub path: String,
    pub max_age_hours: i64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            path: "entitlement.json".to_string(),
            max_age_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StabilizerSection {
    /// Consecutive negative resume reads required before a downgrade is
    /// trusted.
    pub negative_streak_threshold: u8,
    /// Upper bound on the streak counter.
    pub negative_streak_cap: u8,
}

impl Default for StabilizerSection {
    fn default() -> Self {
        Self {
            negative_streak_threshold: 2,
            negative_streak_cap: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_layered_yaml_from_strings;

    #[test]
    fn empty_document_yields_defaults() {
        let loaded = load_layered_yaml_from_strings(&["{}"]).unwrap();
        let cfg = loaded.engine_config().unwrap();
        assert_eq!(cfg.platform, Platform::Native);
        assert_eq!(cfg.refresh.watchdog_secs, 8);
        assert_eq!(cfg.cache.max_age_hours, 24);
        assert_eq!(cfg.stabilizer.negative_streak_threshold, 2);
        cfg.validate().unwrap();
    }

    #[test]
    fn full_document_parses() {
        let doc = r#"
platform: web
gateway:
  base_url: "https://billing.example.com"
  timeout_ms: 5000
  retry_max_attempts: 3
  retry_delay_ms: 100
profile:
  base_url: "https://api.example.com"
refresh:
  watchdog_secs: 4
cache:
  path: "state/entitlement.json"
  max_age_hours: 12
stabilizer:
  negative_streak_threshold: 2
  negative_streak_cap: 3
"#;
        let cfg = load_layered_yaml_from_strings(&[doc])
            .unwrap()
            .engine_config()
            .unwrap();
        assert_eq!(cfg.platform, Platform::Web);
        assert_eq!(cfg.gateway.timeout(), Duration::from_millis(5000));
        assert_eq!(cfg.gateway.retry_max_attempts, 3);
        assert_eq!(cfg.refresh.watchdog(), Duration::from_secs(4));
        assert_eq!(cfg.cache.path, "state/entitlement.json");
        cfg.validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_and_oversized_watchdog() {
        let mut cfg = EngineConfig::default();
        cfg.refresh.watchdog_secs = 0;
        assert!(cfg.validate().is_err());
        cfg.refresh.watchdog_secs = 30;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_requires_gateway_url_on_web() {
        let mut cfg = EngineConfig::default();
        cfg.platform = Platform::Web;
        assert!(cfg.validate().is_err());
        cfg.gateway.base_url = "https://billing.example.com".to_string();
        cfg.validate().unwrap();
    }

    #[test]
    fn validate_rejects_cap_below_threshold() {
        let mut cfg = EngineConfig::default();
        cfg.stabilizer.negative_streak_cap = 1;
        assert!(cfg.validate().is_err());
    }
}
