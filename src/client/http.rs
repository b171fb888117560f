//! HTTP transport for the update client.
//!
//! [`Transport`] is the seam between [`UpdateClient`](super::UpdateClient) and the
//! network: tests substitute an in-memory implementation, production code uses
//! [`HttpTransport`] built on `reqwest`.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::UpdateError;
use crate::models::{DownloadProgress, ProgressCallback};

/// Header carrying the API credential.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Authenticated GET and download.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GETs `url` and decodes the body as JSON.
    ///
    /// A non-success HTTP status is an error.
    async fn get_json(&self, url: &str, api_key: &str) -> Result<serde_json::Value>;

    /// Streams `url` into `dest` and returns the number of bytes written.
    ///
    /// `expected_size` (0 when unknown) is reported as the progress total when the
    /// response has no `Content-Length`. `progress` receives non-decreasing byte
    /// counts. A non-success HTTP status is a terminal error, and cancellation fails
    /// with [`UpdateError::Cancelled`].
    async fn download(
        &self,
        url: &str,
        api_key: &str,
        dest: &Path,
        expected_size: u64,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<u64>;
}

/// `reqwest`-backed [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// `timeout` bounds connection setup and JSON requests; downloads are bounded by
    /// connection setup only.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("updraft/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            timeout,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, url: &str, api_key: &str) -> Result<serde_json::Value> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, api_key)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            bail!("HTTP {}: {}", status.as_u16(), body);
        }

        response.json().await.context("Failed to decode response")
    }

    async fn download(
        &self,
        url: &str,
        api_key: &str,
        dest: &Path,
        expected_size: u64,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        debug!("Downloading {} to {:?}", url, dest);
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {}", status.as_u16());
        }

        let total = response.content_length().unwrap_or(expected_size);
        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create file: {dest:?}"))?;

        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                () = cancel.cancelled() => return Err(UpdateError::Cancelled.into()),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk.context("Failed to download file")?;
            file.write_all(&chunk).await.context("Failed to write downloaded data")?;
            downloaded += chunk.len() as u64;

            if let Some(callback) = &progress {
                callback(&DownloadProgress::new(downloaded, total));
            }
        }

        file.flush().await.context("Failed to flush downloaded file")?;
        debug!("Downloaded {} bytes from {}", downloaded, url);
        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response and returns the raw request it received.
    async fn serve_once(status: &'static str, body: &'static [u8]) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let n = socket.read(&mut request).await.unwrap();
            let header = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(header.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request[..n]).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn test_get_json_sends_api_key() {
        let (base, server) = serve_once("200 OK", br#"{"code":200}"#).await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let value = transport.get_json(&format!("{base}/check"), "secret").await.unwrap();
        assert_eq!(value["code"], 200);

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /check"));
        assert!(request.contains("x-api-key: secret"));
    }

    #[tokio::test]
    async fn test_get_json_non_success_status() {
        let (base, _server) = serve_once("503 Service Unavailable", b"down").await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let err = transport.get_json(&base, "k").await.unwrap_err();
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_download_reports_progress() {
        let (base, _server) = serve_once("200 OK", b"0123456789").await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("artifact");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |p: &DownloadProgress| {
            sink.lock().unwrap().push((p.downloaded, p.total));
        });

        let bytes = transport
            .download(&base, "k", &dest, 0, Some(callback), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(bytes, 10);
        assert_eq!(std::fs::read(&dest).unwrap(), b"0123456789");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&(10, 10)));
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[tokio::test]
    async fn test_download_http_error_is_terminal() {
        let (base, _server) = serve_once("404 Not Found", b"").await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let temp = tempfile::tempdir().unwrap();

        let err = transport
            .download(&base, "k", &temp.path().join("x"), 0, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP 404");
        assert!(!temp.path().join("x").exists());
    }
}
