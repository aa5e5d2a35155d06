use resv_config::{
    load_layered_yaml_from_strings, report_unused_keys, ConfigConsumer, UnusedKeyPolicy,
};

const YAML: &str = r#"
store:
  backend: memory
engine:
  max_commit_attempts: 5
live_view:
  channel_capacity: 64
daemon:
  addr: "127.0.0.1:8899"
unused_section:
  foo: 123
  bar: 456
"#;

#[test]
fn warn_policy_reports_without_error() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report =
        report_unused_keys(ConfigConsumer::Daemon, &loaded.config_json, UnusedKeyPolicy::Warn)
            .expect("warn policy must not error");

    assert_eq!(
        report.unused_leaf_pointers,
        vec![
            "/unused_section/bar".to_string(),
            "/unused_section/foo".to_string()
        ]
    );
}

#[test]
fn fail_policy_errors_on_unused_keys() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let err = report_unused_keys(ConfigConsumer::Daemon, &loaded.config_json, UnusedKeyPolicy::Fail)
        .unwrap_err();
    assert!(format!("{err:?}").contains("CONFIG_UNUSED_KEYS"));
}

#[test]
fn cli_does_not_consume_daemon_sections() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report =
        report_unused_keys(ConfigConsumer::Cli, &loaded.config_json, UnusedKeyPolicy::Warn)
            .unwrap();
    assert!(report
        .unused_leaf_pointers
        .contains(&"/daemon/addr".to_string()));
    assert!(report
        .unused_leaf_pointers
        .contains(&"/live_view/channel_capacity".to_string()));
    assert!(!report
        .unused_leaf_pointers
        .contains(&"/store/backend".to_string()));
}

#[test]
fn fully_consumed_config_is_clean() {
    let yaml = "store:\n  backend: memory\nengine:\n  max_commit_attempts: 2\n";
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report =
        report_unused_keys(ConfigConsumer::Cli, &loaded.config_json, UnusedKeyPolicy::Fail)
            .unwrap();
    assert!(report.is_clean());
    assert_eq!(report.consumer, "CLI");
}
