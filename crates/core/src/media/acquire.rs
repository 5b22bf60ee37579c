use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tempfile::TempDir;
use tracing::{debug, info, instrument};

use super::{MediaFetcher, Transcoder};
use crate::{
    error::{AcquisitionError, ReelsmithError, Result},
    types::is_valid_video_id,
};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "mov", "avi"];

pub fn canonical_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Media fetched for one run. Owns its working directory: dropping the value
/// removes every artifact, whether the run finished, failed or was cancelled.
#[derive(Debug)]
pub struct TransientMedia {
    dir: TempDir,
    audio_path: PathBuf,
    video_path: Option<PathBuf>,
}

impl TransientMedia {
    pub fn audio_path(&self) -> &Path {
        &self.audio_path
    }

    /// Present only when the fetched container holds playable video.
    pub fn video_path(&self) -> Option<&Path> {
        self.video_path.as_deref()
    }

    pub fn work_dir(&self) -> &Path {
        self.dir.path()
    }
}

impl Drop for TransientMedia {
    fn drop(&mut self) {
        debug!(dir = %self.dir.path().display(), "releasing transient media");
    }
}

pub struct TransientMediaAcquirer {
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Arc<dyn Transcoder>,
    work_root: PathBuf,
    min_artifact_bytes: u64,
}

impl TransientMediaAcquirer {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        transcoder: Arc<dyn Transcoder>,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            work_root: work_root.into(),
            min_artifact_bytes: 8192,
        }
    }

    pub fn with_min_artifact_bytes(mut self, min_artifact_bytes: u64) -> Self {
        self.min_artifact_bytes = min_artifact_bytes;
        self
    }

    #[instrument(skip(self), fields(video_id = %video_id))]
    pub async fn acquire(&self, video_id: &str, max_clip_seconds: u32) -> Result<TransientMedia> {
        self.acquire_inner(video_id, max_clip_seconds)
            .await
            .map_err(|source| ReelsmithError::Acquisition {
                video_id: video_id.to_string(),
                source,
            })
    }

    async fn acquire_inner(
        &self,
        video_id: &str,
        max_clip_seconds: u32,
    ) -> std::result::Result<TransientMedia, AcquisitionError> {
        if !is_valid_video_id(video_id) {
            return Err(AcquisitionError::InvalidIdentifier(video_id.to_string()));
        }
        let url = canonical_url(video_id);

        tokio::fs::create_dir_all(&self.work_root).await?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("reelsmith-{video_id}-"))
            .tempdir_in(&self.work_root)?;

        let fetched = self.fetcher.fetch(&url, dir.path()).await?;
        self.check_floor(&fetched.path).await?;

        let audio_path = dir.path().join("audio.mp3");
        self.transcoder
            .extract_audio(&fetched.path, &audio_path, max_clip_seconds)
            .await?;
        if !tokio::fs::try_exists(&audio_path).await.unwrap_or(false) {
            return Err(AcquisitionError::MissingAudio { path: audio_path });
        }
        self.check_floor(&audio_path).await?;

        let video_path = is_video_container(&fetched.path).then_some(fetched.path);
        info!(
            audio = %audio_path.display(),
            has_video = video_path.is_some(),
            "media acquired"
        );

        Ok(TransientMedia {
            dir,
            audio_path,
            video_path,
        })
    }

    async fn check_floor(&self, path: &Path) -> std::result::Result<(), AcquisitionError> {
        let size = tokio::fs::metadata(path).await?.len();
        if size < self.min_artifact_bytes {
            return Err(AcquisitionError::TooSmall {
                path: path.to_path_buf(),
                size,
                floor: self.min_artifact_bytes,
            });
        }
        Ok(())
    }
}

fn is_video_container(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
