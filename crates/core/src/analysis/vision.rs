use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::{
    error::{ReelsmithError, Result},
    types::{KeyObject, Shot, VisionInsights},
};

const CAPABILITY: &str = "video-annotation";

fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// int64 fields arrive as strings in proto3 JSON and as numbers elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProtoInt64 {
    Int(i64),
    Text(String),
}

impl ProtoInt64 {
    fn as_f64(&self) -> Option<f64> {
        match self {
            ProtoInt64::Int(n) => Some(*n as f64),
            ProtoInt64::Text(s) => s.trim().parse::<i64>().ok().map(|n| n as f64),
        }
    }
}

/// A time offset in any of the encodings the annotation service uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeOffset {
    Seconds(f64),
    /// Duration string such as `"4.5s"`.
    Text(String),
    Duration {
        #[serde(default)]
        seconds: Option<ProtoInt64>,
        #[serde(default)]
        nanos: Option<i64>,
    },
}

impl TimeOffset {
    pub fn as_seconds(&self) -> Option<f64> {
        match self {
            TimeOffset::Seconds(s) => Some(*s),
            TimeOffset::Text(text) => {
                let text = text.trim();
                text.strip_suffix('s').unwrap_or(text).parse().ok()
            }
            TimeOffset::Duration { seconds, nanos } => {
                let whole = match seconds {
                    Some(s) => s.as_f64()?,
                    None => 0.0,
                };
                Some(whole + nanos.unwrap_or(0) as f64 / 1e9)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSegment {
    #[serde(default, alias = "start_time_offset")]
    pub start_time_offset: Option<TimeOffset>,
    #[serde(default, alias = "end_time_offset")]
    pub end_time_offset: Option<TimeOffset>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(default, alias = "entity_id")]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "language_code")]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelSegment {
    #[serde(default)]
    pub segment: Option<VideoSegment>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelAnnotation {
    #[serde(default)]
    pub entity: Option<Entity>,
    #[serde(default, alias = "category_entities", deserialize_with = "nullable")]
    pub category_entities: Vec<Entity>,
    #[serde(default, deserialize_with = "nullable")]
    pub segments: Vec<LabelSegment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectTrackingAnnotation {
    #[serde(default)]
    pub entity: Option<Entity>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub segment: Option<VideoSegment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationStatus {
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAnnotationResults {
    #[serde(default, alias = "input_uri")]
    pub input_uri: Option<String>,
    #[serde(default, alias = "shot_annotations", deserialize_with = "nullable")]
    pub shot_annotations: Vec<VideoSegment>,
    #[serde(default, alias = "shot_label_annotations", deserialize_with = "nullable")]
    pub shot_label_annotations: Vec<LabelAnnotation>,
    #[serde(default, alias = "segment_label_annotations", deserialize_with = "nullable")]
    pub segment_label_annotations: Vec<LabelAnnotation>,
    #[serde(default, alias = "object_annotations", deserialize_with = "nullable")]
    pub object_annotations: Vec<ObjectTrackingAnnotation>,
    #[serde(default)]
    pub error: Option<AnnotationStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotateVideoResponse {
    #[serde(default, alias = "annotation_results", deserialize_with = "nullable")]
    pub annotation_results: Vec<VideoAnnotationResults>,
}

/// The shapes a video annotation backend may hand back.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationPayload {
    Native(AnnotateVideoResponse),
    /// Raw JSON, either the response itself or a finished operation wrapping it.
    Mapping(Value),
}

/// Normalized insights plus a record of the repairs applied to reach them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisionNormalization {
    pub insights: VisionInsights,
    /// Windows with a negative offset or an end before their start.
    pub clamped_windows: usize,
    /// Set when the service returned no annotation results at all.
    pub degraded: bool,
}

fn unusable(reason: impl Into<String>) -> ReelsmithError {
    ReelsmithError::Normalization {
        capability: CAPABILITY,
        reason: reason.into(),
    }
}

pub fn normalize_annotations(payload: AnnotationPayload) -> Result<VisionNormalization> {
    let response = match payload {
        AnnotationPayload::Native(response) => response,
        AnnotationPayload::Mapping(mut value) => {
            if let Some(inner) = value.get_mut("response").map(Value::take) {
                value = inner;
            }
            if !value.is_object() {
                return Err(unusable("annotation response is not an object"));
            }
            serde_json::from_value(value)
                .map_err(|e| unusable(format!("unreadable annotation response: {e}")))?
        }
    };

    if response.annotation_results.is_empty() {
        return Ok(VisionNormalization {
            degraded: true,
            ..Default::default()
        });
    }

    let mut clamped = 0usize;
    let mut window = |segment: Option<&VideoSegment>| -> (f64, f64) {
        let offset = |o: Option<&TimeOffset>| o.and_then(TimeOffset::as_seconds).unwrap_or(0.0);
        let (start, end) = segment
            .map(|s| {
                (
                    offset(s.start_time_offset.as_ref()),
                    offset(s.end_time_offset.as_ref()),
                )
            })
            .unwrap_or((0.0, 0.0));
        let (start, end, repaired) = clamp_window(start, end);
        if repaired {
            clamped += 1;
        }
        (start, end)
    };

    let mut insights = VisionInsights::default();
    for result in &response.annotation_results {
        if let Some(status) = &result.error {
            if status.code.unwrap_or(0) != 0 || status.message.is_some() {
                return Err(unusable(format!(
                    "annotation failed for {}: {}",
                    result.input_uri.as_deref().unwrap_or("input"),
                    status.message.as_deref().unwrap_or("unknown error"),
                )));
            }
        }

        for shot in &result.shot_annotations {
            let (start_sec, end_sec) = window(Some(shot));
            insights.shots.push(Shot { start_sec, end_sec });
        }

        for label in result
            .shot_label_annotations
            .iter()
            .chain(&result.segment_label_annotations)
        {
            let Some(description) = entity_description(label.entity.as_ref()) else {
                continue;
            };
            let categories: Vec<String> = label
                .category_entities
                .iter()
                .filter_map(|e| entity_description(Some(e)))
                .collect();
            for seg in &label.segments {
                let (start_sec, end_sec) = window(seg.segment.as_ref());
                insights.key_objects.push(KeyObject {
                    description: description.clone(),
                    categories: categories.clone(),
                    confidence: seg.confidence.map(|c| c.clamp(0.0, 1.0)),
                    start_sec,
                    end_sec,
                });
            }
        }

        for object in &result.object_annotations {
            let Some(description) = entity_description(object.entity.as_ref()) else {
                continue;
            };
            let (start_sec, end_sec) = window(object.segment.as_ref());
            insights.key_objects.push(KeyObject {
                description,
                categories: Vec::new(),
                confidence: object.confidence.map(|c| c.clamp(0.0, 1.0)),
                start_sec,
                end_sec,
            });
        }
    }

    Ok(VisionNormalization {
        insights,
        clamped_windows: clamped,
        degraded: false,
    })
}

fn entity_description(entity: Option<&Entity>) -> Option<String> {
    entity
        .and_then(|e| e.description.as_deref())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

/// Negative offsets become 0; an end before the start collapses to a
/// zero-length window at the start.
fn clamp_window(start: f64, end: f64) -> (f64, f64, bool) {
    let mut repaired = false;
    let start = if start < 0.0 || start.is_nan() {
        repaired = true;
        0.0
    } else {
        start
    };
    let end = if end < start || end.is_nan() {
        repaired = true;
        start
    } else {
        end
    };
    (start, end, repaired)
}

/// Raw shot/label detection capability.
#[async_trait]
pub trait VideoAnnotator: Send + Sync {
    async fn annotate(&self, video_path: &Path) -> Result<AnnotationPayload>;
}

pub struct VisionInsightNormalizer {
    backend: Arc<dyn VideoAnnotator>,
}

impl VisionInsightNormalizer {
    pub fn new(backend: Arc<dyn VideoAnnotator>) -> Self {
        Self { backend }
    }

    pub async fn analyze(&self, video_path: &Path) -> Result<VisionInsights> {
        Ok(self.analyze_with_report(video_path).await?.insights)
    }

    #[instrument(skip(self), fields(video = %video_path.display()))]
    pub async fn analyze_with_report(&self, video_path: &Path) -> Result<VisionNormalization> {
        let payload = self.backend.annotate(video_path).await?;
        let report = normalize_annotations(payload)?;

        if report.degraded {
            warn!("annotation service returned no results, continuing without visual insights");
        }
        if report.clamped_windows > 0 {
            warn!(
                clamped = report.clamped_windows,
                "clamped out-of-order annotation windows"
            );
        }
        info!(
            shots = report.insights.shots.len(),
            key_objects = report.insights.key_objects.len(),
            "vision insights normalized"
        );
        Ok(report)
    }
}
