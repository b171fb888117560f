//! The `updraft` binary, driven through `assert_cmd`.

use assert_cmd::Command;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use updraft::client::CHECK_ENDPOINT;

use super::common::{self, TestServer, check_body, pack_release, read_tree, release, write_tree};

/// The binary with no updraft variables inherited from the environment.
fn updraft() -> Command {
    let mut cmd = Command::cargo_bin("updraft").unwrap();
    cmd.env_remove("UPDRAFT_CONFIG")
        .env_remove("UPDRAFT_API_KEY")
        .env_remove("UPDRAFT_CURRENT_VERSION")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, server_url: &str) -> std::path::PathBuf {
    let path = dir.join("updraft.toml");
    let settings = common::settings(server_url, 3);
    fs::write(&path, toml::to_string(&settings).unwrap()).unwrap();
    path
}

/// Runs `cmd` off the async runtime so the test server keeps serving.
async fn run(mut cmd: Command) -> assert_cmd::assert::Assert {
    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap()).await.unwrap();
    output.assert()
}

#[test]
fn test_help() {
    updraft()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("history"));
}

#[test]
fn test_missing_config_file() {
    let temp = tempfile::tempdir().unwrap();
    updraft()
        .current_dir(temp.path())
        .args(["check", "--current-version", "1.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config"))
        .stderr(predicate::str::contains("updraft.toml"));
}

#[test]
fn test_invalid_config_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(
        temp.path().join("updraft.toml"),
        "server_url = \"https://u.example.com\"\napi_key = \"k\"\nupdate_mode = \"sometimes\"\n",
    )
    .unwrap();

    updraft()
        .current_dir(temp.path())
        .args(["check", "--current-version", "1.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"))
        .stderr(predicate::str::contains("sometimes"));
}

#[test]
fn test_history_on_fresh_install() {
    let temp = tempfile::tempdir().unwrap();
    updraft()
        .current_dir(temp.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No update history."));
}

#[test]
fn test_update_requires_known_current_version() {
    let temp = tempfile::tempdir().unwrap();
    write_config(temp.path(), "http://127.0.0.1:9");

    updraft()
        .current_dir(temp.path())
        .arg("update")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--current-version"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_history_and_rollback() {
    let artifacts = tempfile::tempdir().unwrap();
    let artifact = artifacts.path().join("2.0.tar.gz");
    let (size, hash) = pack_release(&[("bin/app", "app v2"), ("app.conf", "defaults")], &artifact).await;
    let version = release("2.0", 20, "/files/2.0.tar.gz", size, &hash);

    let mut routes = HashMap::new();
    routes.insert("/files/2.0.tar.gz".to_string(), fs::read(&artifact).unwrap());
    routes.insert(CHECK_ENDPOINT.to_string(), check_body(&[version], None));
    let server = TestServer::start(routes).await;

    let work = tempfile::tempdir().unwrap();
    let config = write_config(work.path(), &server.base_url);
    let install = work.path().join("install");
    write_tree(&install, &[("bin/app", "app v1"), ("app.conf", "tuned")]);
    let before = read_tree(&install);

    let base = |args: &[&str]| {
        let mut cmd = updraft();
        cmd.arg("--config").arg(&config).arg("--install-dir").arg(&install).arg("--no-progress").args(args);
        cmd
    };

    run(base(&["check", "--current-version", "1.0"]))
        .await
        .success()
        .stdout(predicate::str::contains("2.0"));

    run(base(&["update", "--current-version", "1.0"]))
        .await
        .success()
        .stdout(predicate::str::contains("Updated"));

    let after = read_tree(&install);
    assert_eq!(after["bin/app"], "app v2");
    assert_eq!(after["app.conf"], "tuned");

    run(base(&["history"]))
        .await
        .success()
        .stdout(predicate::str::contains("2.0").and(predicate::str::contains("success")));

    run(base(&["rollback", "--yes"]))
        .await
        .success()
        .stdout(predicate::str::contains("Rolled back"));
    assert_eq!(read_tree(&install), before);
}
