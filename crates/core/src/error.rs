use std::{fmt, path::PathBuf};

use thiserror::Error;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Acquire,
    Transcribe,
    Vision,
    Scenario,
    Storyboard,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Acquire => "acquire",
            Stage::Transcribe => "transcribe",
            Stage::Vision => "vision",
            Stage::Scenario => "scenario",
            Stage::Storyboard => "storyboard",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("invalid video identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("{} is {size} bytes, below the {floor} byte floor", path.display())]
    TooSmall { path: PathBuf, size: u64, floor: u64 },

    #[error("transcode of {} exited with {status}: {stderr}", input.display())]
    Transcode {
        input: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("{program} did not finish within {timeout_secs}s")]
    Timeout { program: String, timeout_secs: u64 },

    #[error("no audio produced at {}", path.display())]
    MissingAudio { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a generated payload was rejected. The message is fed back to the model
/// verbatim on the corrective turn.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("response is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("response does not match the {schema} schema: {detail}")]
    Schema { schema: &'static str, detail: String },

    #[error("{0}")]
    Invariant(String),
}

#[derive(Error, Debug)]
pub enum ReelsmithError {
    #[error("acquisition failed for {video_id}: {source}")]
    Acquisition {
        video_id: String,
        #[source]
        source: AcquisitionError,
    },

    #[error("{capability} returned an unusable response: {reason}")]
    Normalization {
        capability: &'static str,
        reason: String,
    },

    #[error("{stage} generation failed after {attempts} attempt(s): {last_error}")]
    Generation {
        stage: Stage,
        attempts: u32,
        last_error: ValidationError,
    },

    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} answered HTTP {status}: {body}")]
    UpstreamStatus {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} did not answer within {seconds}s")]
    Timeout { service: &'static str, seconds: u64 },

    #[error("{stage} stage failed for {video_id}: {source}")]
    Stage {
        stage: Stage,
        video_id: String,
        #[source]
        source: Box<ReelsmithError>,
    },

    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReelsmithError>;

impl ReelsmithError {
    /// `map_err` adapter for reqwest failures against `service`.
    pub fn transport(service: &'static str) -> impl Fn(reqwest::Error) -> Self {
        move |source| ReelsmithError::Transport { service, source }
    }

    /// Transient upstream conditions worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReelsmithError::Transport { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            ReelsmithError::Timeout { .. } => true,
            ReelsmithError::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Attributes the error to a stage of a given video's run. Already
    /// attributed errors pass through unchanged.
    pub fn within(self, stage: Stage, video_id: &str) -> Self {
        match self {
            err @ ReelsmithError::Stage { .. } => err,
            err => ReelsmithError::Stage {
                stage,
                video_id: video_id.to_string(),
                source: Box::new(err),
            },
        }
    }

    /// Stage this error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ReelsmithError::Stage { stage, .. } => Some(*stage),
            ReelsmithError::Generation { stage, .. } => Some(*stage),
            ReelsmithError::Acquisition { .. } => Some(Stage::Acquire),
            _ => None,
        }
    }
}

/// Keeps upstream error bodies readable in logs and messages.
pub(crate) fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 512;
    if body.len() <= LIMIT {
        return body.to_string();
    }
    let mut end = LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
