use std::{fmt, ops::RangeInclusive, str::FromStr};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<Segment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Transcript {
    /// End of the last segment, in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.segments.last().map(|s| s.end).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub start_sec: f64,
    pub end_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyObject {
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub start_sec: f64,
    pub end_sec: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionInsights {
    pub shots: Vec<Shot>,
    pub key_objects: Vec<KeyObject>,
}

/// Everything the generation stage needs from one analysed video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub transcript: Transcript,
    pub shots: Vec<Shot>,
    #[serde(default)]
    pub key_objects: Vec<KeyObject>,
}

impl AnalysisResult {
    pub fn new(transcript: Transcript, vision: VisionInsights) -> Self {
        Self {
            transcript,
            shots: vision.shots,
            key_objects: vision.key_objects,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VoiceLine {
    pub role: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    #[serde(alias = "duration")]
    pub duration_sec: u32,
    pub visual_description: String,
    pub voice_lines: Vec<VoiceLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScenarioMeta {
    pub topic: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scenario {
    pub scenes: Vec<Scene>,
    pub meta: ScenarioMeta,
}

impl Scenario {
    pub fn total_duration_sec(&self) -> u64 {
        self.scenes.iter().map(|s| u64::from(s.duration_sec)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StoryScene {
    #[serde(flatten)]
    pub scene: Scene,
    pub broll_hints: Vec<String>,
    pub tempo: String,
    pub transitions: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Shorts,
    Youtube,
}

impl Target {
    /// Inclusive bounds on a storyboard's total duration, in seconds.
    pub fn duration_window(self) -> RangeInclusive<u32> {
        match self {
            Target::Shorts => 45..=60,
            Target::Youtube => 60..=120,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Target::Shorts => "shorts",
            Target::Youtube => "youtube",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shorts" => Ok(Target::Shorts),
            "youtube" => Ok(Target::Youtube),
            other => Err(format!("unknown target {other:?} (expected shorts or youtube)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Storyboard {
    pub scenes: Vec<StoryScene>,
    #[serde(alias = "total_duration")]
    pub total_duration_sec: u32,
    pub target: Target,
}

impl Storyboard {
    pub fn scene_duration_sum(&self) -> u64 {
        self.scenes
            .iter()
            .map(|s| u64::from(s.scene.duration_sec))
            .sum()
    }
}

/// A ranked catalog search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub video_id: String,
    pub title: String,
    pub channel_title: String,
    pub published_at: DateTime<Utc>,
    pub view_count: u64,
    pub like_count: u64,
    pub is_shorts: bool,
}

/// Video identifiers end up in URLs and on-disk paths, so only the catalog's
/// own alphabet is accepted.
pub fn is_valid_video_id(video_id: &str) -> bool {
    !video_id.is_empty()
        && video_id.len() <= 64
        && video_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
