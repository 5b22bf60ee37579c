use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tokio::fs;

use crate::{
    error::{ReelsmithError, Result},
    types::{AnalysisResult, Transcript, VisionInsights, is_valid_video_id},
};

const TRANSCRIPT_FILE: &str = "transcript.json";
const VISION_FILE: &str = "vision.json";

/// Per-video JSON snapshots under `{root}/{video_id}/`. Writes replace the
/// previous snapshot atomically.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the snapshot directory for a given video
    pub fn video_dir(&self, video_id: &str) -> Result<PathBuf> {
        if !is_valid_video_id(video_id) {
            return Err(ReelsmithError::Config(format!(
                "invalid video identifier {video_id:?}"
            )));
        }
        Ok(self.root.join(video_id))
    }

    pub async fn save_analysis(&self, video_id: &str, analysis: &AnalysisResult) -> Result<()> {
        let dir = self.video_dir(video_id)?;
        let vision = VisionInsights {
            shots: analysis.shots.clone(),
            key_objects: analysis.key_objects.clone(),
        };
        let transcript_path = dir.join(TRANSCRIPT_FILE);
        save_json(&transcript_path, &analysis.transcript).await?;
        if let Err(e) = save_json(&dir.join(VISION_FILE), &vision).await {
            // Without vision.json, load_analysis reports no snapshot.
            let _ = fs::remove_file(&transcript_path).await;
            return Err(e);
        }
        Ok(())
    }

    /// `None` when either half of the snapshot is missing.
    pub async fn load_analysis(&self, video_id: &str) -> Result<Option<AnalysisResult>> {
        let dir = self.video_dir(video_id)?;
        let transcript_path = dir.join(TRANSCRIPT_FILE);
        let vision_path = dir.join(VISION_FILE);
        if !fs::try_exists(&transcript_path).await? || !fs::try_exists(&vision_path).await? {
            return Ok(None);
        }

        let transcript: Transcript = load_json(&transcript_path).await?;
        let vision: VisionInsights = load_json(&vision_path).await?;
        Ok(Some(AnalysisResult::new(transcript, vision)))
    }
}

pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json_content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&json_content)?)
}

/// Writes pretty JSON through a sibling temp file and a rename.
pub async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KeyObject, Segment, Shot};

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            transcript: Transcript {
                segments: vec![Segment {
                    text: "привет".into(),
                    start: 0.0,
                    end: 1.0,
                }],
                language: Some("ru".into()),
            },
            shots: vec![Shot {
                start_sec: 0.0,
                end_sec: 5.0,
            }],
            key_objects: vec![KeyObject {
                description: "Car".into(),
                categories: vec!["Vehicle".into()],
                confidence: Some(0.95),
                start_sec: 1.0,
                end_sec: 4.5,
            }],
        }
    }

    #[tokio::test]
    async fn analysis_snapshot_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        assert!(store.load_analysis("abc").await.unwrap().is_none());
        store.save_analysis("abc", &analysis()).await.unwrap();

        assert!(dir.path().join("abc/transcript.json").exists());
        assert!(dir.path().join("abc/vision.json").exists());
        assert_eq!(store.load_analysis("abc").await.unwrap(), Some(analysis()));
    }

    #[tokio::test]
    async fn overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.save_analysis("abc", &analysis()).await.unwrap();
        store.save_analysis("abc", &analysis()).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join("abc"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2, "{names:?}");
    }

    #[tokio::test]
    async fn failed_vision_write_discards_the_new_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        // A non-empty directory where vision.json belongs makes the rename fail.
        std::fs::create_dir_all(dir.path().join("abc/vision.json/blocker")).unwrap();

        assert!(store.save_analysis("abc", &analysis()).await.is_err());

        assert!(!dir.path().join("abc/transcript.json").exists());
        assert!(store.load_analysis("abc").await.unwrap().is_none());
    }

    #[test]
    fn rejects_path_like_ids() {
        let store = SnapshotStore::new("/data");
        assert!(store.video_dir("../escape").is_err());
        assert_eq!(store.video_dir("abc").unwrap(), PathBuf::from("/data/abc"));
    }
}
