//! End-to-end update flows through the public API and a local HTTP server.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use updraft::client::{CHECK_ENDPOINT, UpdateClient};
use updraft::config::UpdaterConfig;
use updraft::core::{ErrorKind, UpdateError};
use updraft::models::{DownloadProgress, ProgressCallback, UpdateStatus};
use updraft::upgrade::{HistoryLedger, UpdateOrchestrator, UpdateState};

use super::common::{self, STATE_DIR, TestServer, check_body, pack_release, read_tree, release, write_tree};

const INSTALLED: &[(&str, &str)] = &[
    ("bin/app", "app v1"),
    ("config.yaml", "user: edited"),
    ("data/notes.txt", "keep me"),
];

const RELEASE_2_0: &[(&str, &str)] = &[
    ("bin/app", "app v2"),
    ("config.yaml", "user: default"),
    ("lib/plugin.so", "plugin v2"),
];

/// Serves a version check listing `releases` plus their artifacts.
async fn serve_releases(
    releases: &[(&str, i64, &[(&str, &str)])],
    forced: Option<&str>,
) -> (TestServer, tempfile::TempDir) {
    let artifacts = tempfile::tempdir().unwrap();
    let mut routes = HashMap::new();
    let mut versions = Vec::new();

    for (version, weight, files) in releases {
        let path = artifacts.path().join(format!("{version}.tar.gz"));
        let (size, hash) = pack_release(files, &path).await;
        let url = format!("/files/{version}.tar.gz");
        routes.insert(url.clone(), fs::read(&path).unwrap());
        let mut info = release(version, *weight, &url, size, &hash);
        info.is_forced = forced == Some(*version);
        versions.push(info);
    }
    routes.insert(CHECK_ENDPOINT.to_string(), check_body(&versions, forced));

    (TestServer::start(routes).await, artifacts)
}

fn config_for(server: &TestServer, backup_count: usize) -> UpdaterConfig {
    UpdaterConfig::new(common::settings(&server.base_url, backup_count)).unwrap()
}

#[tokio::test]
async fn test_full_update_preserves_user_files() {
    let (server, _artifacts) = serve_releases(&[("2.0", 20, RELEASE_2_0)], None).await;
    let config = config_for(&server, 3);
    let install = tempfile::tempdir().unwrap();
    write_tree(install.path(), INSTALLED);

    let client = UpdateClient::new(config.clone()).unwrap();
    let mut orchestrator = UpdateOrchestrator::open(&config, install.path()).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let progress: ProgressCallback = Arc::new(move |p: &DownloadProgress| sink.lock().unwrap().push(p.downloaded));

    let report = client
        .update_to_recommended("1.0", &mut orchestrator, Some(progress), &CancellationToken::new())
        .await
        .unwrap()
        .expect("an update is available");

    assert_eq!(report.version, "2.0");
    assert_eq!(report.files_preserved, 1);
    assert_eq!(orchestrator.state(), UpdateState::Succeeded);

    let tree = read_tree(install.path());
    assert_eq!(tree["bin/app"], "app v2");
    assert_eq!(tree["config.yaml"], "user: edited");
    assert_eq!(tree["lib/plugin.so"], "plugin v2");
    assert_eq!(tree["data/notes.txt"], "keep me");

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));

    // The ledger is persisted next to the backups.
    let reopened = HistoryLedger::open(install.path().join(STATE_DIR).join("history.json")).await.unwrap();
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.records()[0].status, UpdateStatus::Success);
    assert!(reopened.records()[0].backup_path.exists());
}

#[tokio::test]
async fn test_forced_floor_wins_over_latest() {
    let release_1_5: &[(&str, &str)] = &[("bin/app", "app v1.5")];
    let (server, _artifacts) =
        serve_releases(&[("2.0", 20, RELEASE_2_0), ("1.5", 15, release_1_5)], Some("1.5")).await;
    let config = config_for(&server, 3);
    let install = tempfile::tempdir().unwrap();
    write_tree(install.path(), INSTALLED);

    let client = UpdateClient::new(config.clone()).unwrap();
    assert_eq!(client.forced_update("1.0").await.unwrap().unwrap().version, "1.5");

    let mut orchestrator = UpdateOrchestrator::open(&config, install.path()).await.unwrap();
    let report = client
        .update_to_recommended("1.0", &mut orchestrator, None, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.version, "1.5");
    assert_eq!(read_tree(install.path())["bin/app"], "app v1.5");
}

#[tokio::test]
async fn test_apply_failure_restores_installation() {
    // `data` is a directory in the installation and a file in the release.
    let conflicting: &[(&str, &str)] = &[("a.txt", "new a"), ("data", "not a directory")];
    let (server, _artifacts) = serve_releases(&[("2.0", 20, conflicting)], None).await;
    let config = config_for(&server, 3);
    let install = tempfile::tempdir().unwrap();
    write_tree(install.path(), &[("a.txt", "old a"), ("data/notes.txt", "keep me")]);
    let before = read_tree(install.path());

    let client = UpdateClient::new(config.clone()).unwrap();
    let mut orchestrator = UpdateOrchestrator::open(&config, install.path()).await.unwrap();

    let err = client
        .update_to_version("2.0", "1.0", &mut orchestrator, None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UpdateFailed);
    assert_eq!(orchestrator.state(), UpdateState::RolledBack);
    assert_eq!(read_tree(install.path()), before);

    let history = orchestrator.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, UpdateStatus::RolledBack);
}

#[tokio::test]
async fn test_checksum_mismatch_leaves_installation_untouched() {
    let artifacts = tempfile::tempdir().unwrap();
    let artifact = artifacts.path().join("2.0.tar.gz");
    let (size, _) = pack_release(RELEASE_2_0, &artifact).await;
    let version = release("2.0", 20, "/files/2.0.tar.gz", size, &"0".repeat(64));

    let mut routes = HashMap::new();
    routes.insert("/files/2.0.tar.gz".to_string(), fs::read(&artifact).unwrap());
    routes.insert(CHECK_ENDPOINT.to_string(), check_body(&[version], None));
    let server = TestServer::start(routes).await;

    let config = config_for(&server, 3);
    let install = tempfile::tempdir().unwrap();
    write_tree(install.path(), INSTALLED);
    let before = read_tree(install.path());

    let client = UpdateClient::new(config.clone()).unwrap();
    let mut orchestrator = UpdateOrchestrator::open(&config, install.path()).await.unwrap();
    let err = client
        .update_to_version("2.0", "1.0", &mut orchestrator, None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::VerifyFailed { .. }));
    assert_eq!(read_tree(install.path()), before);
    assert!(orchestrator.history().is_empty());
    assert_eq!(orchestrator.state(), UpdateState::Idle);
}

#[tokio::test]
async fn test_wrong_api_key_is_an_api_failure() {
    let (server, _artifacts) = serve_releases(&[("2.0", 20, RELEASE_2_0)], None).await;
    let mut settings = common::settings(&server.base_url, 3);
    settings.api_key = "wrong".into();
    let client = UpdateClient::new(UpdaterConfig::new(settings).unwrap()).unwrap();

    let err = client.check_for_updates("1.0").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CheckFailed);
    assert!(format!("{:#}", anyhow::Error::from(err)).contains("401"));
}

#[tokio::test]
async fn test_pruning_keeps_backup_count_snapshots() {
    let config = common::config(2);
    let install = tempfile::tempdir().unwrap();
    write_tree(install.path(), INSTALLED);
    let artifacts = tempfile::tempdir().unwrap();

    let mut orchestrator = UpdateOrchestrator::open(&config, install.path()).await.unwrap();
    for (i, version) in ["1.1", "1.2", "1.3"].into_iter().enumerate() {
        let artifact = artifacts.path().join(format!("{version}.tar.gz"));
        let content = format!("app {version}");
        let (size, hash) = pack_release(&[("bin/app", content.as_str())], &artifact).await;
        let info = release(version, 11 + i as i64, "", size, &hash);

        orchestrator.update(&info, &artifact, &CancellationToken::new()).await.unwrap();
    }

    let backups: Vec<_> = fs::read_dir(install.path().join(STATE_DIR).join("backups"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(backups.len(), 2);

    let history = orchestrator.history();
    assert_eq!(history.iter().map(|r| r.version.as_str()).collect::<Vec<_>>(), ["1.2", "1.3"]);
    for record in history {
        assert!(backups.contains(&record.backup_path), "{:?} has no backup file", record.backup_path);
    }
}

#[tokio::test]
async fn test_rollback_undoes_update() {
    let config = common::config(3);
    let install = tempfile::tempdir().unwrap();
    write_tree(install.path(), INSTALLED);
    let before = read_tree(install.path());

    let artifacts = tempfile::tempdir().unwrap();
    let artifact = artifacts.path().join("2.0.tar.gz");
    let (size, hash) = pack_release(RELEASE_2_0, &artifact).await;

    let mut orchestrator = UpdateOrchestrator::open(&config, install.path()).await.unwrap();
    orchestrator
        .update(&release("2.0", 20, "", size, &hash), &artifact, &CancellationToken::new())
        .await
        .unwrap();
    assert_ne!(read_tree(install.path()), before);

    // A fresh orchestrator finds the update through the persisted ledger.
    let mut orchestrator = UpdateOrchestrator::open(&config, install.path()).await.unwrap();
    orchestrator.rollback("2.0").await.unwrap();
    assert_eq!(read_tree(install.path()), before);

    // Restoring the same snapshot again changes nothing.
    orchestrator.rollback("2.0").await.unwrap();
    assert_eq!(read_tree(install.path()), before);
    assert_eq!(orchestrator.history().len(), 1);

    let err = orchestrator.rollback("9.9").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackupNotFound);
}
