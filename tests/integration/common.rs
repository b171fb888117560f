//! Shared fixtures for the integration suite.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use updraft::archive::{ArchiveCodec, TarGzCodec};
use updraft::config::{UpdaterConfig, UpdaterSettings};
use updraft::models::VersionInfo;
use updraft::upgrade::ChecksumVerifier;
use walkdir::WalkDir;

pub const STATE_DIR: &str = ".updraft";

/// Writes `files` (relative path, content) under `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

/// Every regular file under `root` except the state dir, as relative path → content.
pub fn read_tree(root: &Path) -> BTreeMap<String, String> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.depth() != 1 || e.file_name() != STATE_DIR)
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            (rel, fs::read_to_string(e.path()).unwrap())
        })
        .collect()
}

/// Packs `files` into a release archive at `dest`; returns its size and SHA-256.
pub async fn pack_release(files: &[(&str, &str)], dest: &Path) -> (u64, String) {
    let staging = tempfile::tempdir().unwrap();
    write_tree(staging.path(), files);
    TarGzCodec.pack(staging.path(), dest, &[], &CancellationToken::new()).unwrap();

    let size = fs::metadata(dest).unwrap().len();
    let hash = ChecksumVerifier::compute_sha256(dest).await.unwrap();
    (size, hash)
}

pub fn settings(server_url: &str, backup_count: usize) -> UpdaterSettings {
    let mut settings = UpdaterSettings::new(server_url, "integration-key");
    settings.platform = Some("linux".into());
    settings.arch = Some("amd64".into());
    settings.backup_count = backup_count;
    settings
}

pub fn config(backup_count: usize) -> UpdaterConfig {
    UpdaterConfig::new(settings("https://updates.example.com", backup_count)).unwrap()
}

pub fn release(version: &str, weight: i64, download_url: &str, size: u64, hash: &str) -> VersionInfo {
    VersionInfo {
        version: version.into(),
        version_weight: weight,
        download_url: download_url.into(),
        file_size: size,
        file_hash: hash.into(),
        is_downloadable: true,
        ..VersionInfo::default()
    }
}

/// The JSON a server returns for a version check.
pub fn check_body(versions: &[VersionInfo], forced: Option<&str>) -> Vec<u8> {
    let data = serde_json::json!({
        "hasUpdate": !versions.is_empty(),
        "currentVersion": "1.0",
        "latestVersion": versions.first().map(|v| v.version.clone()).unwrap_or_default(),
        "availableVersions": versions,
        "updateStrategy": {
            "hasForced": forced.is_some(),
            "minRequiredVersion": forced.unwrap_or_default(),
        },
    });
    serde_json::to_vec(&serde_json::json!({ "code": 200, "message": "ok", "data": data })).unwrap()
}

/// A minimal HTTP/1.1 server answering GETs by path (query ignored) until dropped.
///
/// Every response closes its connection. Requests without the integration API key
/// get a 401.
pub struct TestServer {
    pub base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start(routes: HashMap<String, Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let routes = Arc::new(routes);

        let handle = tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = Arc::clone(&routes);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let mut len = 0;
                    while !buf[..len].windows(4).any(|w| w == b"\r\n\r\n") && len < buf.len() {
                        match socket.read(&mut buf[len..]).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => len += n,
                        }
                    }
                    let request = String::from_utf8_lossy(&buf[..len]).to_string();
                    let path = request
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or("/")
                        .split('?')
                        .next()
                        .unwrap_or("/")
                        .to_string();
                    let authorized = request.to_lowercase().contains("x-api-key: integration-key");

                    let (status, body) = match routes.get(&path) {
                        _ if !authorized => ("401 Unauthorized", b"missing api key".to_vec()),
                        Some(body) => ("200 OK", body.clone()),
                        None => ("404 Not Found", Vec::new()),
                    };
                    let head = format!(
                        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            base_url,
            handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
