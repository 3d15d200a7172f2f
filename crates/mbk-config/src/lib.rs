//! mbk-config
//!
//! Layered YAML configuration for the entitlement engine.
//!
//! Layers merge in order (base → platform → local overrides); the merged
//! document is canonicalized to JSON and hashed so diagnostics can state
//! exactly which configuration a device was running. Two guardrails:
//!
//! - **No secret literals.** API keys and tokens never live in config
//!   files; config names the *environment variable* that holds them. Any
//!   leaf string that looks like a secret aborts the load.
//! - **Unknown-key lint.** Every leaf key must be one the engine actually
//!   reads; leftovers from renames are reported (warn or fail).

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

mod engine;

pub use engine::{
    CacheSection, EngineConfig, GatewaySection, NativeSection, Platform, ProfileSection,
    RefreshSection, StabilizerSection,
};

/// Known secret-like prefixes. A leaf string value starting with one of
/// these aborts the load with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // Stripe / OpenAI style
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "rk_live",    // Stripe restricted
    "appl_",      // purchase-SDK Apple platform key
    "goog_",      // purchase-SDK Google platform key
    "eyJ",        // bare JWT
    "-----BEGIN", // PEM private keys
];

/// Every leaf pointer the engine reads. The config surface is small and
/// flat, so this is an exact list rather than a prefix registry; extend it
/// in the same change that adds the read.
pub const KNOWN_LEAF_POINTERS: &[&str] = &[
    "/platform",
    "/native/api_key_env",
    "/gateway/base_url",
    "/gateway/timeout_ms",
    "/gateway/retry_max_attempts",
    "/gateway/retry_delay_ms",
    "/profile/base_url",
    "/profile/timeout_ms",
    "/refresh/watchdog_secs",
    "/cache/path",
    "/cache/max_age_hours",
    "/stabilizer/negative_streak_threshold",
    "/stabilizer/negative_streak_cap",
];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Merged configuration with its canonical form and hash.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Parse the merged document into the typed engine view.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        serde_json::from_value(self.config_json.clone()).context("config shape invalid")
    }
}

/// Read and merge YAML files in order: earlier paths are base, later
/// paths override.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }
    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

/// Merge YAML documents (already in memory) in order.
pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json =
        serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Secret-literal guard
// ---------------------------------------------------------------------------

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(Value::String(s)) = v.pointer(&ptr) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

// ---------------------------------------------------------------------------
// Unknown-key lint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownKeyPolicy {
    Warn,
    Fail,
}

/// Leaf pointers present in the config that the engine never reads.
/// Sorted for deterministic output.
pub fn unknown_leaf_pointers(config_json: &Value) -> Vec<String> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unknown: Vec<String> = leaves
        .into_iter()
        .filter(|lp| !KNOWN_LEAF_POINTERS.contains(&lp.as_str()))
        .collect();
    unknown.sort();
    unknown.dedup();
    unknown
}

/// Enforce the unknown-key lint. `Warn` always returns the list; `Fail`
/// errors when the list is non-empty.
pub fn check_unknown_keys(config_json: &Value, policy: UnknownKeyPolicy) -> Result<Vec<String>> {
    let unknown = unknown_leaf_pointers(config_json);
    if policy == UnknownKeyPolicy::Fail && !unknown.is_empty() {
        bail!(
            "CONFIG_UNKNOWN_KEYS: {} config leaf key(s) the engine never reads: {:?}",
            unknown.len(),
            unknown
        );
    }
    Ok(unknown)
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
