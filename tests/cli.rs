// ABOUTME: Integration tests for the watchtower binary.
// ABOUTME: Covers --help output and startup failures that happen before any engine call.

use assert_cmd::Command;
use predicates::prelude::*;

fn watchtower_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("watchtower"));
    cmd.env_clear();
    cmd
}

#[test]
fn help_lists_main_flags() {
    watchtower_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--schedule"))
        .stdout(predicate::str::contains("--cleanup"))
        .stdout(predicate::str::contains("--http-api-update"));
}

#[test]
fn schedule_and_interval_are_exclusive() {
    watchtower_cmd()
        .args(["--interval", "30", "--schedule", "0 0 4 * * *"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("only schedule or interval"));
}

#[test]
fn http_api_needs_a_token() {
    watchtower_cmd()
        .arg("--http-api-update")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("token"));
}

#[test]
fn token_can_come_from_the_environment() {
    // Fails later, on the unsupported host, which proves the token was accepted.
    watchtower_cmd()
        .env("WATCHTOWER_HTTP_API_TOKEN", "t0k")
        .args(["--http-api-update", "-H", "ftp://engine"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unsupported engine host"));
}

#[test]
fn invalid_cron_is_rejected() {
    watchtower_cmd()
        .args(["--schedule", "every tuesday"])
        .assert()
        .code(1);
}

#[test]
fn bad_duration_is_a_usage_error() {
    watchtower_cmd()
        .args(["--stop-timeout", "soon"])
        .assert()
        .code(2);
}

#[test]
fn old_api_version_is_rejected() {
    watchtower_cmd()
        .args(["--api-version", "1.12"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("1.25 is the minimum"));
}

#[test]
fn tls_needs_a_tcp_host() {
    watchtower_cmd()
        .env("DOCKER_TLS_VERIFY", "1")
        .env("DOCKER_CERT_PATH", "/certs")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("TLS verification needs a tcp:// engine host"));
}
