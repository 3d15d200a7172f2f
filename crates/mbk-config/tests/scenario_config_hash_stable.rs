//! Config hash determinism.
//!
//! GREEN when:
//! - the same YAML input always produces the same config_hash,
//! - key order within a document does not affect the hash,
//! - a changed value changes the hash,
//! - layering produces the same hash regardless of how many calls built
//!   the input strings.

use mbk_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
platform: native
gateway:
  base_url: "https://billing.example.com"
  timeout_ms: 8000
cache:
  path: "entitlement.json"
  max_age_hours: 24
"#;

/// Same content as BASE_YAML with keys in a different order.
const BASE_YAML_REORDERED: &str = r#"
cache:
  max_age_hours: 24
  path: "entitlement.json"
gateway:
  timeout_ms: 8000
  base_url: "https://billing.example.com"
platform: native
"#;

const OVERLAY_YAML: &str = r#"
gateway:
  timeout_ms: 4000
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn key_order_does_not_affect_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_changes_hash() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let layered = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, layered.config_hash);
    assert_eq!(layered.config_json["gateway"]["timeout_ms"], 4000);
    // Non-overlaid keys survive the merge.
    assert_eq!(
        layered.config_json["gateway"]["base_url"],
        "https://billing.example.com"
    );
}

#[test]
fn layered_load_is_stable_across_calls() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}
