//! Integration tests for the `lumen fetch` command.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn lumen(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lumen").unwrap();
    cmd.env_remove("LUMEN_TOKEN")
        .env_remove("RUST_LOG")
        .arg("--log-level")
        .arg("warn")
        .arg("fetch")
        .arg("--config")
        .arg(config_dir.path().join("config.toml"));
    cmd
}

#[test]
fn test_fetch_without_token_is_not_authenticated() {
    let temp_dir = TempDir::new().unwrap();

    lumen(&temp_dir)
        .arg("/api/media/x.png")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains(r#""status":"failed""#))
        .stdout(predicate::str::contains(r#""error":"Not authenticated""#));
}

#[test]
fn test_fetch_reports_ready_resource() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/api/media/x.png")
        .match_header("authorization", "Bearer cli-token")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body("hi")
        .expect(1)
        .create();
    let temp_dir = TempDir::new().unwrap();

    lumen(&temp_dir)
        .arg("--token")
        .arg("cli-token")
        .arg("--base-url")
        .arg(server.url())
        .arg("--data-url")
        .arg("/api/media/x.png")
        .arg(format!("{}/api/media/x.png", server.url()))
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status":"ready""#))
        .stdout(predicate::str::contains(r#""key":"/api/media/x.png""#))
        .stdout(predicate::str::contains(r#""bytes":2"#))
        .stdout(predicate::str::contains("data:image/png;base64,aGk="));

    mock.assert();
}

#[test]
fn test_fetch_token_from_environment() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/api/resources/resource-123")
        .match_header("authorization", "Bearer env-token")
        .with_status(200)
        .with_body("blob")
        .create();
    let temp_dir = TempDir::new().unwrap();

    lumen(&temp_dir)
        .env("LUMEN_TOKEN", "env-token")
        .arg("--base-url")
        .arg(server.url())
        .arg("resource-123")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""key":"resource-123""#));

    mock.assert();
}

#[test]
fn test_fetch_rejected_resource_fails() {
    let mut server = mockito::Server::new();
    let _mock = server.mock("GET", "/api/media/missing.png").with_status(404).create();
    let temp_dir = TempDir::new().unwrap();

    lumen(&temp_dir)
        .arg("--token")
        .arg("cli-token")
        .arg("--base-url")
        .arg(server.url())
        .arg("/api/media/missing.png")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Failed to fetch resource: 404"))
        .stderr(predicate::str::contains("1 of 1 resources failed"));
}

#[test]
fn test_fetch_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("config.toml"), "[resources]\nrequest_timeout_secs = 0\n").unwrap();

    lumen(&temp_dir)
        .arg("--token")
        .arg("cli-token")
        .arg("/api/media/x.png")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid request timeout"));
}
