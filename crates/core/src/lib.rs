pub mod analysis;
pub mod catalog;
pub mod config;
pub mod error;
pub mod format;
pub mod generation;
pub mod media;
pub mod pipeline;
pub mod provider;
pub mod retry;
pub mod snapshot;
pub mod types;

pub use catalog::{CatalogApi, TrendingQuery, YoutubeDataApi, search_trending};
pub use config::{FetchBackend, Settings};
pub use error::{AcquisitionError, ReelsmithError, Result, Stage, ValidationError};
pub use format::{
    format_candidates_readable, format_scenario_readable, format_storyboard_readable,
    format_timestamp, format_transcript_with_timestamps,
};
pub use pipeline::{Pipeline, PipelineOutput, catalog_from_settings, generator_from_settings};
pub use provider::{Provider, ProviderConfig};
pub use snapshot::SnapshotStore;
pub use types::{
    AnalysisResult, Candidate, KeyObject, Scenario, ScenarioMeta, Scene, Segment, Shot,
    StoryScene, Storyboard, Target, Transcript, VisionInsights, VoiceLine,
};
