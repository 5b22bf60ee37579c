use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::model::{CompletionRequest, GenerativeModel};
use crate::error::{ReelsmithError, Result, truncate_body};

const SERVICE: &str = "chat-completions";

/// Structured outputs when a schema is known, plain JSON mode otherwise.
fn response_format(schema_hint: Option<&Value>) -> Value {
    match schema_hint {
        Some(schema) => json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema["title"].as_str().unwrap_or("output"),
                "schema": schema,
            },
        }),
        None => json!({"type": "json_object"}),
    }
}

/// OpenAI-compatible chat completions client for any [`crate::Provider`].
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ChatCompletionsClient {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl GenerativeModel for ChatCompletionsClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        debug!(model = %self.model, messages = request.messages.len(), "chat completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "messages": request.messages,
                "temperature": request.temperature,
                "response_format": response_format(request.schema_hint.as_ref()),
            }))
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

        let response = response
            .json::<serde_json::Value>()
            .await
            .map_err(ReelsmithError::transport(SERVICE))?;

        // Extract content from response
        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ReelsmithError::Normalization {
                capability: SERVICE,
                reason: format!(
                    "response has no message content: {}",
                    truncate_body(&response.to_string())
                ),
            })?;

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_hint_selects_structured_outputs() {
        let schema = json!({"title": "Storyboard", "type": "object"});
        let format = response_format(Some(&schema));
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["name"], "Storyboard");
        assert_eq!(format["json_schema"]["schema"], schema);

        assert_eq!(response_format(None), json!({"type": "json_object"}));
    }

    #[test]
    fn untitled_schema_gets_a_fallback_name() {
        let format = response_format(Some(&json!({"type": "object"})));
        assert_eq!(format["json_schema"]["name"], "output");
    }
}
