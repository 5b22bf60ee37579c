use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::{
    error::{ReelsmithError, Result},
    types::{Segment, Transcript},
};

const CAPABILITY: &str = "speech-to-text";

/// Verbose transcription as returned by whisper-style services. Every field is
/// optional on the wire; [`normalize_transcription`] decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerboseTranscription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<SegmentRecord>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
}

/// The shapes a speech-to-text backend may hand back.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptionResponse {
    /// A typed response object.
    Native(VerboseTranscription),
    /// A typed response that was serialized to a JSON object before handoff.
    Dumped(Value),
    /// A plain key/value mapping.
    Mapping(Map<String, Value>),
}

impl TranscriptionResponse {
    /// Serializes any typed response into the `Dumped` shape.
    pub fn dump<T: Serialize>(response: &T) -> Result<Self> {
        Ok(TranscriptionResponse::Dumped(serde_json::to_value(response)?))
    }
}

fn unusable(reason: impl Into<String>) -> ReelsmithError {
    ReelsmithError::Normalization {
        capability: CAPABILITY,
        reason: reason.into(),
    }
}

/// Decodes any [`TranscriptionResponse`] into a [`Transcript`]. All three
/// shapes carrying the same segments produce the same transcript.
pub fn normalize_transcription(response: TranscriptionResponse) -> Result<Transcript> {
    let verbose = match response {
        TranscriptionResponse::Native(verbose) => verbose,
        TranscriptionResponse::Dumped(value) => decode(value)?,
        TranscriptionResponse::Mapping(map) => decode(Value::Object(map))?,
    };

    let records = verbose
        .segments
        .ok_or_else(|| unusable("response did not include segments"))?;

    let segments = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let (Some(text), Some(start), Some(end)) = (record.text, record.start, record.end)
            else {
                return Err(unusable(format!(
                    "segment {index} is missing text, start or end"
                )));
            };
            if !(start >= 0.0 && end >= start) {
                return Err(unusable(format!(
                    "segment {index} has invalid bounds {start}..{end}"
                )));
            }
            Ok(Segment {
                text: text.trim().to_string(),
                start,
                end,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Transcript {
        segments,
        language: verbose.language,
    })
}

fn decode(value: Value) -> Result<VerboseTranscription> {
    if !value.is_object() {
        return Err(unusable("response is not an object"));
    }
    serde_json::from_value(value).map_err(|e| unusable(format!("unreadable response: {e}")))
}

/// Raw speech-to-text capability.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResponse>;
}

pub struct TranscriptionNormalizer {
    backend: Arc<dyn SpeechToText>,
}

impl TranscriptionNormalizer {
    pub fn new(backend: Arc<dyn SpeechToText>) -> Self {
        Self { backend }
    }

    #[instrument(skip(self), fields(audio = %audio_path.display()))]
    pub async fn transcribe(&self, audio_path: &Path) -> Result<Transcript> {
        let response = self.backend.transcribe(audio_path).await?;
        let transcript = normalize_transcription(response)?;
        info!(
            segments = transcript.segments.len(),
            language = transcript.language.as_deref().unwrap_or("unknown"),
            "transcription normalized"
        );
        Ok(transcript)
    }
}
