use std::{path::Path, time::Duration};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value};
use tracing::debug;

use super::transcription::{SpeechToText, TranscriptionResponse};
use crate::error::{ReelsmithError, Result, truncate_body};

const SERVICE: &str = "openai-transcription";
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Hosted whisper transcription returning verbose JSON with segment timings.
#[derive(Debug, Clone)]
pub struct OpenAiTranscriber {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAiTranscriber {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: "whisper-1".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SpeechToText for OpenAiTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResponse> {
        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();
        debug!(bytes = bytes.len(), file = %file_name, "uploading audio for transcription");

        let file = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(ReelsmithError::transport(SERVICE))?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(ReelsmithError::transport(SERVICE))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReelsmithError::UpstreamStatus {
                service: SERVICE,
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let body: Map<String, Value> = response
            .json()
            .await
            .map_err(ReelsmithError::transport(SERVICE))?;
        Ok(TranscriptionResponse::Mapping(body))
    }
}
