use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use crate::{
    error::{ReelsmithError, Result},
    provider::Provider,
};

/// How source media is pulled from the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchBackend {
    #[default]
    YtDlp,
    Cobalt,
}

impl FromStr for FetchBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ytdlp" | "yt-dlp" => Ok(FetchBackend::YtDlp),
            "cobalt" => Ok(FetchBackend::Cobalt),
            other => Err(format!("unknown fetch backend {other:?}")),
        }
    }
}

impl fmt::Display for FetchBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchBackend::YtDlp => f.write_str("ytdlp"),
            FetchBackend::Cobalt => f.write_str("cobalt"),
        }
    }
}

/// Runtime settings, read once from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub youtube_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub provider: Provider,
    /// Overrides the provider's default chat model.
    pub llm_model: Option<String>,
    /// Bearer token for the video annotation service.
    pub video_intelligence_token: Option<String>,
    /// API key for the video annotation service, used when no token is set.
    pub google_api_key: Option<String>,
    pub region_code: String,
    pub default_published_after: Option<String>,
    pub fetch_backend: FetchBackend,
    pub cobalt_base_url: String,
    pub cobalt_video_quality: String,
    pub llm_timeout: Duration,
    pub http_timeout: Duration,
    pub subprocess_timeout: Duration,
    pub vision_timeout: Duration,
    pub youtube_max_retries: u32,
    pub max_clip_seconds: u32,
    pub min_artifact_bytes: u64,
    /// Root for per-video analysis snapshots.
    pub data_dir: PathBuf,
    /// Parent for transient per-run media directories.
    pub work_dir: PathBuf,
    pub scenario_temperature: f32,
    pub storyboard_temperature: f32,
    pub target_language: String,
    pub target_audience: String,
    pub whisper_model_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            youtube_api_key: None,
            openai_api_key: None,
            provider: Provider::Openai,
            llm_model: None,
            video_intelligence_token: None,
            google_api_key: None,
            region_code: "RU".to_string(),
            default_published_after: None,
            fetch_backend: FetchBackend::YtDlp,
            cobalt_base_url: "http://localhost:9000".to_string(),
            cobalt_video_quality: "720".to_string(),
            llm_timeout: Duration::from_secs(700),
            http_timeout: Duration::from_secs(30),
            subprocess_timeout: Duration::from_secs(600),
            vision_timeout: Duration::from_secs(180),
            youtube_max_retries: 3,
            max_clip_seconds: 90,
            min_artifact_bytes: 8192,
            data_dir: default_data_dir(),
            work_dir: std::env::temp_dir(),
            scenario_temperature: 0.0,
            storyboard_temperature: 0.0,
            target_language: "русский".to_string(),
            target_audience: "русскоязычная аудитория 18–35".to_string(),
            whisper_model_path: None,
        }
    }
}

impl Settings {
    /// Create settings from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup. Unset and blank values
    /// fall back to defaults; present but unparsable values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Settings::default();

        let provider = match get("LLM_PROVIDER") {
            Some(raw) => raw.parse::<Provider>().map_err(ReelsmithError::Config)?,
            None => defaults.provider,
        };
        let fetch_backend = match get("FETCH_BACKEND") {
            Some(raw) => raw.parse::<FetchBackend>().map_err(ReelsmithError::Config)?,
            None => defaults.fetch_backend,
        };

        Ok(Self {
            youtube_api_key: get("YOUTUBE_API_KEY"),
            openai_api_key: get("OPENAI_API_KEY"),
            provider,
            llm_model: get("LLM_MODEL"),
            video_intelligence_token: get("VIDEO_INTELLIGENCE_TOKEN"),
            google_api_key: get("GOOGLE_API_KEY"),
            region_code: get("REGION_CODE").unwrap_or(defaults.region_code),
            default_published_after: get("DEFAULT_PUBLISHED_AFTER"),
            fetch_backend,
            cobalt_base_url: get("COBALT_BASE_URL").unwrap_or(defaults.cobalt_base_url),
            cobalt_video_quality: get("COBALT_VIDEO_QUALITY")
                .unwrap_or(defaults.cobalt_video_quality),
            llm_timeout: parse_secs(&get, "LLM_TIMEOUT_SECONDS", defaults.llm_timeout)?,
            http_timeout: parse_secs(&get, "HTTP_TIMEOUT_SECONDS", defaults.http_timeout)?,
            subprocess_timeout: parse_secs(
                &get,
                "SUBPROCESS_TIMEOUT_SECONDS",
                defaults.subprocess_timeout,
            )?,
            vision_timeout: parse_secs(&get, "VISION_TIMEOUT_SECONDS", defaults.vision_timeout)?,
            youtube_max_retries: parse_or(&get, "YOUTUBE_MAX_RETRIES", defaults.youtube_max_retries)?,
            max_clip_seconds: parse_or(&get, "MAX_CLIP_SECONDS", defaults.max_clip_seconds)?,
            min_artifact_bytes: parse_or(&get, "MIN_ARTIFACT_BYTES", defaults.min_artifact_bytes)?,
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            work_dir: get("WORK_DIR").map(PathBuf::from).unwrap_or(defaults.work_dir),
            scenario_temperature: parse_or(
                &get,
                "SCENARIO_TEMPERATURE",
                defaults.scenario_temperature,
            )?,
            storyboard_temperature: parse_or(
                &get,
                "STORYBOARD_TEMPERATURE",
                defaults.storyboard_temperature,
            )?,
            target_language: get("TARGET_LANGUAGE").unwrap_or(defaults.target_language),
            target_audience: get("TARGET_AUDIENCE").unwrap_or(defaults.target_audience),
            whisper_model_path: get("WHISPER_MODEL_PATH").map(PathBuf::from),
        })
    }

    pub fn require_youtube_key(&self) -> Result<&str> {
        self.youtube_api_key
            .as_deref()
            .ok_or_else(|| ReelsmithError::MissingApiKey {
                env_var: "YOUTUBE_API_KEY".to_string(),
            })
    }

    pub fn require_openai_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| ReelsmithError::MissingApiKey {
                env_var: "OPENAI_API_KEY".to_string(),
            })
    }
}

/// `~/.local/share/reelsmith` or the platform equivalent.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("reelsmith")
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ReelsmithError::Config(format!("{key}={raw:?} is not a valid value"))),
        None => Ok(default),
    }
}

fn parse_secs<G>(get: &G, key: &str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default.as_secs()).map(Duration::from_secs)
}
