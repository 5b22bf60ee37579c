//! Structured-output generation with validation and bounded correction.
//!
//! A request is a system turn plus a user turn carrying the JSON payload. The
//! model's answer is parsed, decoded into the output type and checked against
//! domain invariants. A rejected answer earns one corrective system turn
//! naming the error; the budget is [`MAX_ATTEMPTS`] attempts in total.
//!
//! The retry loop lives in [`GenerationSession`], a plain state machine that
//! tests can drive without a model:
//!
//! ```text
//! Pending -> Validating -> Done
//!                       -> Retrying -> Validating
//!                       -> Failed
//! ```

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::model::{ChatMessage, CompletionRequest, GenerativeModel};
use crate::error::{ReelsmithError, Result, Stage, ValidationError};

pub const MAX_ATTEMPTS: u32 = 2;

/// Parses and checks one raw model answer.
pub trait OutputValidator: Send + Sync {
    type Output: Send;

    /// Schema name used in error and corrective messages.
    fn schema_name(&self) -> &'static str;

    /// The schema and invariants restated on every corrective turn.
    fn requirements(&self) -> String;

    fn schema_hint(&self) -> Option<Value> {
        None
    }

    fn validate(&self, raw: &str) -> std::result::Result<Self::Output, ValidationError>;
}

/// Parses model text as JSON, tolerating a surrounding markdown code fence.
pub fn parse_json_payload(raw: &str) -> std::result::Result<Value, ValidationError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().strip_suffix("```").unwrap_or(rest))
        .unwrap_or(trimmed)
        .trim();

    let value: Value =
        serde_json::from_str(body).map_err(|e| ValidationError::MalformedJson(e.to_string()))?;
    if !value.is_object() {
        return Err(ValidationError::MalformedJson(
            "expected a JSON object at the top level".to_string(),
        ));
    }
    Ok(value)
}

pub fn decode_schema<T: DeserializeOwned>(
    value: Value,
    schema: &'static str,
) -> std::result::Result<T, ValidationError> {
    serde_json::from_value(value).map_err(|e| ValidationError::Schema {
        schema,
        detail: e.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationState {
    Pending,
    Validating { attempt: u32 },
    Retrying { attempt: u32, error: ValidationError },
    Done { attempt: u32 },
    Failed { attempts: u32, error: ValidationError },
}

/// What the caller does after submitting a verdict.
#[derive(Debug, PartialEq)]
pub enum Transition<T> {
    Retry,
    Done(T),
    Failed {
        attempts: u32,
        error: ValidationError,
    },
}

/// Conversation and attempt bookkeeping for one generation.
#[derive(Debug, Clone)]
pub struct GenerationSession {
    base: Vec<ChatMessage>,
    correction: Option<ChatMessage>,
    schema_name: &'static str,
    requirements: String,
    max_attempts: u32,
    attempt: u32,
    state: GenerationState,
}

impl GenerationSession {
    pub fn new(
        system: ChatMessage,
        user: ChatMessage,
        schema_name: &'static str,
        requirements: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        Self {
            base: vec![system, user],
            correction: None,
            schema_name,
            requirements: requirements.into(),
            max_attempts: max_attempts.max(1),
            attempt: 0,
            state: GenerationState::Pending,
        }
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The conversation the next attempt sends: the original turns plus at
    /// most one corrective turn about the latest failure.
    pub fn conversation(&self) -> Vec<ChatMessage> {
        let mut messages = self.base.clone();
        messages.extend(self.correction.clone());
        messages
    }

    /// Starts the next attempt. `None` once the session is settled or while
    /// an attempt is still awaiting its verdict.
    pub fn begin_attempt(&mut self) -> Option<Vec<ChatMessage>> {
        match self.state {
            GenerationState::Pending | GenerationState::Retrying { .. } => {
                self.attempt += 1;
                self.state = GenerationState::Validating {
                    attempt: self.attempt,
                };
                Some(self.conversation())
            }
            _ => None,
        }
    }

    pub fn submit<T>(
        &mut self,
        verdict: std::result::Result<T, ValidationError>,
    ) -> Transition<T> {
        let attempt = self.attempt;
        match verdict {
            Ok(output) => {
                self.state = GenerationState::Done { attempt };
                Transition::Done(output)
            }
            Err(error) if attempt < self.max_attempts => {
                self.correction = Some(ChatMessage::system(self.corrective_text(&error)));
                self.state = GenerationState::Retrying {
                    attempt,
                    error,
                };
                Transition::Retry
            }
            Err(error) => {
                self.state = GenerationState::Failed {
                    attempts: attempt,
                    error: error.clone(),
                };
                Transition::Failed {
                    attempts: attempt,
                    error,
                }
            }
        }
    }

    fn corrective_text(&self, error: &ValidationError) -> String {
        format!(
            "Validation error: {error}. {requirements} Return STRICT JSON matching the {schema} schema, with no commentary.",
            requirements = self.requirements,
            schema = self.schema_name,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptContext {
    pub stage: Stage,
    pub subject: String,
    pub attempt: u32,
}

/// Sees every outbound request and raw answer, for offline debugging.
#[async_trait]
pub trait AttemptObserver: Send + Sync {
    async fn on_request(&self, ctx: &AttemptContext, request: &CompletionRequest);

    async fn on_response(
        &self,
        _ctx: &AttemptContext,
        _raw: &str,
        _rejection: Option<&ValidationError>,
    ) {
    }
}

pub struct TracingObserver;

#[async_trait]
impl AttemptObserver for TracingObserver {
    async fn on_request(&self, ctx: &AttemptContext, request: &CompletionRequest) {
        debug!(
            stage = %ctx.stage,
            subject = %ctx.subject,
            attempt = ctx.attempt,
            messages = request.messages.len(),
            "sending generation request"
        );
    }

    async fn on_response(
        &self,
        ctx: &AttemptContext,
        raw: &str,
        rejection: Option<&ValidationError>,
    ) {
        debug!(
            stage = %ctx.stage,
            subject = %ctx.subject,
            attempt = ctx.attempt,
            bytes = raw.len(),
            accepted = rejection.is_none(),
            "received generation response"
        );
    }
}

/// Writes each attempt to `{root}/{subject}/trail/`.
pub struct JsonTrail {
    root: PathBuf,
}

impl JsonTrail {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file(&self, ctx: &AttemptContext, suffix: &str) -> PathBuf {
        self.root
            .join(&ctx.subject)
            .join("trail")
            .join(format!("{}-attempt{}-{suffix}", ctx.stage, ctx.attempt))
    }

    async fn write(&self, path: PathBuf, contents: Vec<u8>) {
        let result = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, contents).await
        }
        .await;
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "could not write generation trail");
        }
    }
}

#[async_trait]
impl AttemptObserver for JsonTrail {
    async fn on_request(&self, ctx: &AttemptContext, request: &CompletionRequest) {
        match serde_json::to_vec_pretty(request) {
            Ok(bytes) => self.write(self.file(ctx, "request.json"), bytes).await,
            Err(e) => warn!(error = %e, "could not serialize generation request"),
        }
    }

    async fn on_response(
        &self,
        ctx: &AttemptContext,
        raw: &str,
        _rejection: Option<&ValidationError>,
    ) {
        self.write(self.file(ctx, "response.txt"), raw.as_bytes().to_vec())
            .await;
    }
}

/// Inputs for one call to [`ConstrainedGenerator::generate`].
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub stage: Stage,
    /// Identifies the run in logs and trail paths, usually the video id.
    pub subject: &'a str,
    pub instructions: &'a str,
    pub payload: &'a Value,
    pub temperature: f32,
}

pub struct ConstrainedGenerator {
    model: Arc<dyn GenerativeModel>,
    observers: Vec<Arc<dyn AttemptObserver>>,
    max_attempts: u32,
}

impl ConstrainedGenerator {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            model,
            observers: vec![Arc::new(TracingObserver)],
            max_attempts: MAX_ATTEMPTS,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub async fn generate<V: OutputValidator>(
        &self,
        request: GenerationRequest<'_>,
        validator: &V,
    ) -> Result<V::Output> {
        let mut session = GenerationSession::new(
            ChatMessage::system(request.instructions),
            ChatMessage::user(serde_json::to_string(request.payload)?),
            validator.schema_name(),
            validator.requirements(),
            self.max_attempts,
        );
        let schema_hint = validator.schema_hint();

        while let Some(messages) = session.begin_attempt() {
            let ctx = AttemptContext {
                stage: request.stage,
                subject: request.subject.to_string(),
                attempt: session.attempt(),
            };
            let completion = CompletionRequest {
                messages,
                temperature: request.temperature,
                schema_hint: schema_hint.clone(),
            };
            for observer in &self.observers {
                observer.on_request(&ctx, &completion).await;
            }

            let raw = self.model.complete(&completion).await?;
            let verdict = validator.validate(&raw);
            for observer in &self.observers {
                observer
                    .on_response(&ctx, &raw, verdict.as_ref().err())
                    .await;
            }

            match session.submit(verdict) {
                Transition::Done(output) => {
                    info!(stage = %request.stage, subject = %request.subject, attempt = ctx.attempt, "generation accepted");
                    return Ok(output);
                }
                Transition::Retry => {
                    if let GenerationState::Retrying { error, .. } = session.state() {
                        warn!(
                            stage = %request.stage,
                            subject = %request.subject,
                            attempt = ctx.attempt,
                            error = %error,
                            "generation rejected, retrying with correction"
                        );
                    }
                }
                Transition::Failed { attempts, error } => {
                    warn!(stage = %request.stage, subject = %request.subject, attempts, error = %error, "generation failed");
                    return Err(ReelsmithError::Generation {
                        stage: request.stage,
                        attempts,
                        last_error: error,
                    });
                }
            }
        }

        Err(ReelsmithError::Generation {
            stage: request.stage,
            attempts: session.attempt(),
            last_error: ValidationError::Invariant(
                "generation session ended without a verdict".to_string(),
            ),
        })
    }
}
