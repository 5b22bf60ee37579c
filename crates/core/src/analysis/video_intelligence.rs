use std::{path::Path, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use tracing::debug;

use super::vision::{AnnotationPayload, VideoAnnotator};
use crate::error::{ReelsmithError, Result, truncate_body};

const SERVICE: &str = "video-intelligence";
const DEFAULT_BASE_URL: &str = "https://videointelligence.googleapis.com";

#[derive(Debug, Clone)]
enum Credentials {
    ApiKey(String),
    Bearer(String),
}

/// Google Video Intelligence over REST. Uploads the clip inline, then polls
/// the long-running operation until it finishes or the deadline passes.
#[derive(Debug, Clone)]
pub struct VideoIntelligenceClient {
    client: reqwest::Client,
    credentials: Credentials,
    base_url: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl VideoIntelligenceClient {
    fn http_client(request_timeout: Duration) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default()
    }

    /// `timeout` bounds the whole annotation, and also each request until
    /// [`Self::with_request_timeout`] narrows it.
    fn build(credentials: Credentials, timeout: Duration) -> Self {
        Self {
            client: Self::http_client(timeout),
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_api_key(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self::build(Credentials::ApiKey(api_key.into()), timeout)
    }

    pub fn with_bearer_token(token: impl Into<String>, timeout: Duration) -> Self {
        Self::build(Credentials::Bearer(token.into()), timeout)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-request limit for the upload and each poll.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.client = Self::http_client(request_timeout);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Credentials::ApiKey(key) => request.query(&[("key", key)]),
            Credentials::Bearer(token) => request.bearer_auth(token),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = self
            .authorize(request)
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
        response
            .json()
            .await
            .map_err(ReelsmithError::transport(SERVICE))
    }

    async fn annotate_and_wait(&self, video_path: &Path) -> Result<Value> {
        let bytes = tokio::fs::read(video_path).await?;
        let request = self
            .client
            .post(format!("{}/v1/videos:annotate", self.base_url))
            .json(&json!({
                "inputContent": STANDARD.encode(&bytes),
                "features": ["SHOT_CHANGE_DETECTION", "LABEL_DETECTION"],
            }));
        let mut operation = self.send(request).await?;

        loop {
            if operation["done"].as_bool().unwrap_or(false) {
                if let Some(error) = operation.get("error") {
                    return Err(ReelsmithError::Normalization {
                        capability: SERVICE,
                        reason: format!("operation failed: {error}"),
                    });
                }
                return Ok(operation);
            }

            let name = operation["name"]
                .as_str()
                .ok_or_else(|| ReelsmithError::Normalization {
                    capability: SERVICE,
                    reason: "operation has no name".to_string(),
                })?
                .to_string();
            debug!(operation = %name, "annotation pending");
            tokio::time::sleep(self.poll_interval).await;
            operation = self
                .send(self.client.get(format!("{}/v1/{}", self.base_url, name)))
                .await?;
        }
    }
}

#[async_trait]
impl VideoAnnotator for VideoIntelligenceClient {
    async fn annotate(&self, video_path: &Path) -> Result<AnnotationPayload> {
        let operation = tokio::time::timeout(self.timeout, self.annotate_and_wait(video_path))
            .await
            .map_err(|_| ReelsmithError::Timeout {
                service: SERVICE,
                seconds: self.timeout.as_secs(),
            })??;
        Ok(AnnotationPayload::Mapping(operation))
    }
}
