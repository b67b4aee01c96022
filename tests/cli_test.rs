#![allow(deprecated)] // TODO: move from Command::cargo_bin to the cargo_bin_cmd! macro

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary with an isolated environment: no inherited SAIL_* variables and an empty docker config dir.
fn sail(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("sail").unwrap();
    cmd.env_remove("SAIL_HOST")
        .env_remove("SAIL_USER")
        .env_remove("SAIL_PASSWORD")
        .env("DOCKER_CONFIG", config_dir.path())
        .args(["--host", "http://127.0.0.1:9", "--user", "devel", "--password", "secret"]);
    cmd
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("sail").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("service"))
        .stdout(predicate::str::contains("application"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_service_add_help() {
    let mut cmd = Command::cargo_bin("sail").unwrap();
    cmd.args(["service", "add", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--publish"))
        .stdout(predicate::str::contains("--redeploy"))
        .stdout(predicate::str::contains("--network-allow"));
}

#[test]
fn test_config_show() {
    let dir = TempDir::new().unwrap();
    sail(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("username:devel"))
        .stdout(predicate::str::contains("host:127.0.0.1:9"));
}

#[test]
fn test_config_show_reads_docker_config() {
    let dir = TempDir::new().unwrap();
    // "stored:pw"
    std::fs::write(
        dir.path().join("config.json"),
        r#"{"auths": {"sail.example.com": {"auth": "c3RvcmVkOnB3"}}}"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("sail").unwrap();
    cmd.env_remove("SAIL_USER")
        .env_remove("SAIL_PASSWORD")
        .env("DOCKER_CONFIG", dir.path())
        .args(["--host", "sail.example.com", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("username:stored"))
        .stdout(predicate::str::contains("host:sail.example.com"));
}

#[test]
fn test_invalid_port_fails_before_any_request() {
    let dir = TempDir::new().unwrap();
    sail(&dir)
        .args(["service", "add", "devel/nginx", "-p", "70000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid port number '70000'"));
}

#[test]
fn test_invalid_volume_fails() {
    let dir = TempDir::new().unwrap();
    sail(&dir)
        .args(["service", "add", "devel/nginx", "--volume", "/data:10:20"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Volume parameter '/data:10:20'"));
}

#[test]
fn test_invalid_publish_rule_fails() {
    let dir = TempDir::new().unwrap();
    sail(&dir)
        .args(["service", "add", "devel/nginx", "--publish", "a:b:c:d"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid port expose rule 'a:b:c:d'"));
}

#[test]
fn test_foreign_host_in_name_fails() {
    let dir = TempDir::new().unwrap();
    sail(&dir)
        .args(["service", "add", "other.example.com/devel/nginx"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid host other.example.com"));
}

#[test]
fn test_unreachable_api_is_reported() {
    let dir = TempDir::new().unwrap();
    sail(&dir)
        .args(["service", "add", "devel/nginx", "--batch"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_webhook_requires_url() {
    let mut cmd = Command::cargo_bin("sail").unwrap();
    cmd.args(["application", "webhook", "add"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}
