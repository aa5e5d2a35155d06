//! CLI commands that need no database: slug, config-hash, and the refusal
//! to run store-backed commands against the in-memory backend.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn resv() -> Command {
    let mut cmd = Command::cargo_bin("resv").expect("resv binary");
    // Keep engine logs out of assertions.
    cmd.env("RUST_LOG", "error");
    cmd
}

fn write_yaml(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
    let path = dir.path().join(name);
    std::fs::File::create(&path)
        .unwrap()
        .write_all(body.as_bytes())
        .unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn slug_prints_normalized_keys() {
    resv()
        .args(["slug", "Buffet Table", "Café Crème", "कढई"])
        .assert()
        .success()
        .stdout(predicate::str::contains("buffet-table\tBuffet Table"))
        .stdout(predicate::str::contains("cafe-creme\tCafé Crème"))
        .stdout(predicate::str::contains("item-1dhq3\tकढई"));
}

#[test]
fn config_hash_is_stable_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_yaml(
        &dir,
        "base.yaml",
        "store:\n  backend: memory\nengine:\n  max_commit_attempts: 5\n",
    );

    let first = resv().args(["config-hash", &base]).output().unwrap();
    let second = resv().args(["config-hash", &base]).output().unwrap();
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);

    let stdout = String::from_utf8(first.stdout).unwrap();
    let hash_line = stdout.lines().next().unwrap();
    assert!(hash_line.starts_with("config_hash="));
    assert_eq!(hash_line.len(), "config_hash=".len() + 64);
}

#[test]
fn config_hash_refuses_literal_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let leaked = write_yaml(
        &dir,
        "leaked.yaml",
        "store:\n  database_url_env: \"postgres://resv:pw@localhost/resv\"\n",
    );
    resv()
        .args(["config-hash", &leaked])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("pw@").not());
}

#[test]
fn store_commands_refuse_memory_backend() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write_yaml(&dir, "mem.yaml", "store:\n  backend: memory\n");
    resv()
        .args(["list", "--config", &cfg])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CLI_STORE_MEMORY"));

    // Without any config the default backend is memory too.
    resv()
        .args(["report", "--year", "2025", "--month", "12"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CLI_STORE_MEMORY"));
}

#[test]
fn postgres_backend_without_url_names_the_env_var() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write_yaml(
        &dir,
        "pg.yaml",
        "store:\n  backend: postgres\n  database_url_env: RESV_SENTINEL_CLI_URL_NEVER_SET\n",
    );
    resv()
        .args(["audit", "--config", &cfg])
        .env_remove("RESV_SENTINEL_CLI_URL_NEVER_SET")
        .assert()
        .failure()
        .stderr(predicate::str::contains("SECRETS_MISSING"))
        .stderr(predicate::str::contains("RESV_SENTINEL_CLI_URL_NEVER_SET"));
}

#[test]
fn report_rejects_bad_month() {
    resv()
        .args(["report", "--year", "2025", "--month", "13"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("month must be 1..=12"));
}
