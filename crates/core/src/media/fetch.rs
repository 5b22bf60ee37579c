use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::{fs, io::AsyncWriteExt, process::Command};
use tracing::{debug, info};

use super::run_bounded;
use crate::error::{AcquisitionError, truncate_body};

/// A media file placed in the run's working directory.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMedia {
    pub path: PathBuf,
}

/// Downloads source media for a canonical watch URL into `work_dir`.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str, work_dir: &Path) -> Result<FetchedMedia, AcquisitionError>;
}

/// Fetches through the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    program: String,
    format: String,
    timeout: Duration,
}

impl YtDlpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "yt-dlp".to_string(),
            format: "mp4/bestaudio[ext=m4a]".to_string(),
            timeout,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str, work_dir: &Path) -> Result<FetchedMedia, AcquisitionError> {
        let output_template = work_dir.join("source.%(ext)s");
        let mut command = Command::new(&self.program);
        command
            .arg(url)
            .arg("--no-playlist")
            .arg("--print")
            .arg("after_move:filepath")
            .arg("--extractor-args")
            .arg("youtube:player_client=android,web")
            .arg("-f")
            .arg(&self.format)
            .arg("-o")
            .arg(&output_template);

        let output = run_bounded(command, &self.program, self.timeout).await?;

        if !output.status.success() {
            return Err(AcquisitionError::Fetch {
                url: url.to_string(),
                reason: truncate_body(String::from_utf8_lossy(&output.stderr).trim()),
            });
        }

        let stdout_str = String::from_utf8_lossy(output.stdout.as_slice());
        let filepath = stdout_str
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .ok_or_else(|| AcquisitionError::Fetch {
                url: url.to_string(),
                reason: "yt-dlp did not report an output path".to_string(),
            })?;

        debug!(path = filepath, "yt-dlp finished");
        Ok(FetchedMedia {
            path: PathBuf::from(filepath),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CobaltReply {
    status: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Fetches through a cobalt instance: one POST to resolve a tunnel URL, then a
/// streamed GET of that URL into the working directory.
#[derive(Debug, Clone)]
pub struct CobaltFetcher {
    client: reqwest::Client,
    base_url: String,
    video_quality: String,
}

impl CobaltFetcher {
    pub fn new(base_url: impl Into<String>, video_quality: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            video_quality: video_quality.into(),
        }
    }

    fn fetch_error(url: &str, reason: impl Into<String>) -> AcquisitionError {
        AcquisitionError::Fetch {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl MediaFetcher for CobaltFetcher {
    async fn fetch(&self, url: &str, work_dir: &Path) -> Result<FetchedMedia, AcquisitionError> {
        let response = self
            .client
            .post(format!("{}/", self.base_url))
            .header("Accept", "application/json")
            .json(&json!({
                "url": url,
                "videoQuality": self.video_quality,
                "audioFormat": "mp3",
                "filenameStyle": "basic",
                "alwaysProxy": true,
            }))
            .send()
            .await
            .map_err(|e| Self::fetch_error(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::fetch_error(
                url,
                format!("cobalt answered HTTP {}: {}", status.as_u16(), truncate_body(&body)),
            ));
        }

        let reply: CobaltReply = response
            .json()
            .await
            .map_err(|e| Self::fetch_error(url, format!("unreadable cobalt reply: {e}")))?;

        let tunnel = match (reply.status.as_str(), reply.url) {
            ("tunnel" | "redirect" | "stream", Some(tunnel)) => tunnel,
            (status, _) => {
                let detail = reply
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no download url".to_string());
                return Err(Self::fetch_error(
                    url,
                    format!("cobalt status {status}: {detail}"),
                ));
            }
        };

        let extension = reply
            .filename
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4")
            .to_string();
        let target = work_dir.join(format!("source.{extension}"));

        let mut download = self
            .client
            .get(&tunnel)
            .send()
            .await
            .map_err(|e| Self::fetch_error(url, e.to_string()))?;
        if !download.status().is_success() {
            return Err(Self::fetch_error(
                url,
                format!("tunnel answered HTTP {}", download.status().as_u16()),
            ));
        }

        let mut file = fs::File::create(&target).await?;
        let mut written = 0u64;
        while let Some(chunk) = download
            .chunk()
            .await
            .map_err(|e| Self::fetch_error(url, e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!(bytes = written, path = %target.display(), "cobalt download complete");
        Ok(FetchedMedia { path: target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.youtube.com/watch?v=abc123";

    #[tokio::test]
    async fn failing_downloader_is_a_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = YtDlpFetcher::new(Duration::from_secs(5)).with_program("false");

        let err = fetcher.fetch(URL, dir.path()).await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Fetch { ref url, .. } if url == URL));
    }

    #[tokio::test]
    async fn silent_downloader_reports_no_path() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = YtDlpFetcher::new(Duration::from_secs(5)).with_program("true");

        match fetcher.fetch(URL, dir.path()).await.unwrap_err() {
            AcquisitionError::Fetch { reason, .. } => assert!(reason.contains("output path")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
