use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{ReelError, Result};
use crate::segment::SourceAsset;
use crate::workspace::Workspace;

/// Default timeout for a whole download.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(600);

/// Downloads source videos into a run's workspace.
///
/// Failures are reported once; retrying is left to the caller.
pub struct SourceFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for SourceFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Set the timeout for a whole download.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch `url` into a uniquely named file inside `workspace`.
    ///
    /// `http(s)://` URLs are streamed; `file://` URLs and plain paths are copied.
    pub async fn fetch(&self, url: &str, workspace: &mut Workspace) -> Result<SourceAsset> {
        let extension = source_extension(url);
        let destination = workspace.file_path("source", &extension);

        let size_bytes = match local_source(url) {
            Some(local) => self.copy_local(&local, &destination).await?,
            None => self.download(url, &destination).await?,
        };

        if size_bytes == 0 {
            return Err(ReelError::Fetch(format!("Source {url} is empty")));
        }

        info!("Fetched {} ({} bytes) to {:?}", url, size_bytes, destination);

        Ok(SourceAsset {
            url: url.to_string(),
            path: destination,
            size_bytes,
            duration: None,
        })
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        debug!("Downloading {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ReelError::Fetch(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReelError::Fetch(format!("HTTP {status}: {url}")));
        }

        let mut file = fs::File::create(destination).await.map_err(|e| {
            ReelError::Fetch(format!("Failed to create {}: {e}", destination.display()))
        })?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| ReelError::Fetch(format!("Stream from {url} failed: {e}")))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ReelError::Fetch(format!("Write failed: {e}")))?;
            downloaded += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| ReelError::Fetch(format!("Write failed: {e}")))?;

        Ok(downloaded)
    }

    async fn copy_local(&self, source: &Path, destination: &Path) -> Result<u64> {
        debug!("Copying local source {:?}", source);
        fs::copy(source, destination).await.map_err(|e| {
            ReelError::Fetch(format!("Failed to read {}: {e}", source.display()))
        })
    }
}

/// Resolve `file://` URLs and bare paths to a local path.
fn local_source(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return None;
    }
    Some(PathBuf::from(url))
}

/// File extension of the source, ignoring query strings; defaults to `mp4`.
fn source_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path);

    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => "mp4".to_string(),
    }
}
