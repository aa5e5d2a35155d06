//! Config hash stability.
//!
//! - Same input, same hash.
//! - Key order inside YAML does not change the hash.
//! - Different values change it.
//! - Files on disk hash like the same strings.

use resv_config::{load_layered_yaml, load_layered_yaml_from_strings};
use std::io::Write;

const BASE_YAML: &str = r#"
store:
  backend: "postgres"
  database_url_env: "RESV_DATABASE_URL"
engine:
  max_commit_attempts: 5
live_view:
  channel_capacity: 256
daemon:
  addr: "127.0.0.1:8899"
"#;

const BASE_YAML_REORDERED: &str = r#"
daemon:
  addr: "127.0.0.1:8899"
live_view:
  channel_capacity: 256
engine:
  max_commit_attempts: 5
store:
  database_url_env: "RESV_DATABASE_URL"
  backend: "postgres"
"#;

const OVERLAY_YAML: &str = r#"
store:
  backend: "memory"
engine:
  max_commit_attempts: 9
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let original = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let reordered = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(
        original.config_hash, reordered.config_hash,
        "key order in source must not change the hash"
    );
    assert_eq!(original.canonical_json, reordered.canonical_json);
}

#[test]
fn different_values_produce_different_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_takes_effect_and_settings_follow() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    let settings = loaded.settings().unwrap();
    assert_eq!(settings.store.backend, resv_config::StoreBackend::Memory);
    assert_eq!(settings.store.database_url_env, "RESV_DATABASE_URL");
    assert_eq!(settings.engine.max_commit_attempts, 9);
    assert_eq!(settings.daemon.addr, "127.0.0.1:8899");
}

#[test]
fn hash_is_64_hex_chars() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(loaded.config_hash.len(), 64);
    assert!(loaded.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn files_hash_like_strings() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let overlay = dir.path().join("local.yaml");
    std::fs::File::create(&base)
        .unwrap()
        .write_all(BASE_YAML.as_bytes())
        .unwrap();
    std::fs::File::create(&overlay)
        .unwrap()
        .write_all(OVERLAY_YAML.as_bytes())
        .unwrap();

    let from_files =
        load_layered_yaml(&[base.to_str().unwrap(), overlay.to_str().unwrap()]).unwrap();
    let from_strings = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_eq!(from_files.config_hash, from_strings.config_hash);
}

#[test]
fn missing_file_names_the_path() {
    let err = load_layered_yaml(&["/definitely/not/here.yaml"]).unwrap_err();
    assert!(format!("{err:#}").contains("/definitely/not/here.yaml"));
}
