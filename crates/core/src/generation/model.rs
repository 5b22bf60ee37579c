use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One structured-output request: the full conversation so far, always asking
/// for a single JSON object back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// JSON schema of the expected object, for backends that can enforce it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_hint: Option<Value>,
}

/// A chat model that answers with raw text.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
