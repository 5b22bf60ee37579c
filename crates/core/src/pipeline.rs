use std::{sync::Arc, time::Instant};

use serde::Serialize;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::{
    analysis::{
        OpenAiTranscriber, SpeechToText, TranscriptionNormalizer, VideoAnnotator,
        VideoIntelligenceClient, VisionInsightNormalizer,
    },
    catalog::YoutubeDataApi,
    config::{FetchBackend, Settings},
    error::{ReelsmithError, Result, Stage},
    generation::{
        ChatCompletionsClient, ConstrainedGenerator, JsonTrail, Localization, ScenarioSynthesizer,
        StoryboardPlanner,
    },
    media::{
        CobaltFetcher, FfmpegTranscoder, MediaFetcher, TransientMediaAcquirer, YtDlpFetcher,
    },
    provider::Provider,
    snapshot::SnapshotStore,
    types::{AnalysisResult, Scenario, Storyboard, Target, VisionInsights},
};

/// Everything one end-to-end run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub run_id: Uuid,
    pub video_id: String,
    pub analysis: AnalysisResult,
    pub scenario: Scenario,
    pub storyboard: Storyboard,
}

/// Acquire, analyse, write, plan. Stages run in that order for one video;
/// transcription and vision run concurrently in between.
pub struct Pipeline {
    acquirer: TransientMediaAcquirer,
    transcription: TranscriptionNormalizer,
    vision: VisionInsightNormalizer,
    scenario: ScenarioSynthesizer,
    storyboard: StoryboardPlanner,
    snapshots: Option<SnapshotStore>,
    max_clip_seconds: u32,
}

impl Pipeline {
    pub fn new(
        acquirer: TransientMediaAcquirer,
        transcription: TranscriptionNormalizer,
        vision: VisionInsightNormalizer,
        scenario: ScenarioSynthesizer,
        storyboard: StoryboardPlanner,
    ) -> Self {
        Self {
            acquirer,
            transcription,
            vision,
            scenario,
            storyboard,
            snapshots: None,
            max_clip_seconds: 90,
        }
    }

    pub fn with_snapshots(mut self, snapshots: SnapshotStore) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn with_max_clip_seconds(mut self, max_clip_seconds: u32) -> Self {
        self.max_clip_seconds = max_clip_seconds;
        self
    }

    /// Wires every stage from settings: the configured fetch backend, hosted
    /// (or, with `local-whisper`, in-process) transcription, Video
    /// Intelligence and the configured chat provider.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let transcoder = Arc::new(FfmpegTranscoder::new(settings.subprocess_timeout));
        let fetcher: Arc<dyn MediaFetcher> = match settings.fetch_backend {
            FetchBackend::YtDlp => Arc::new(YtDlpFetcher::new(settings.subprocess_timeout)),
            FetchBackend::Cobalt => Arc::new(CobaltFetcher::new(
                settings.cobalt_base_url.clone(),
                settings.cobalt_video_quality.clone(),
                settings.subprocess_timeout,
            )),
        };
        let acquirer =
            TransientMediaAcquirer::new(fetcher, transcoder.clone(), settings.work_dir.clone())
                .with_min_artifact_bytes(settings.min_artifact_bytes);

        let generator = generator_from_settings(settings)?;
        let scenario = ScenarioSynthesizer::new(generator.clone())
            .with_localization(Localization {
                language: settings.target_language.clone(),
                audience: settings.target_audience.clone(),
            })
            .with_temperature(settings.scenario_temperature);
        let storyboard =
            StoryboardPlanner::new(generator).with_temperature(settings.storyboard_temperature);

        Ok(Self::new(
            acquirer,
            TranscriptionNormalizer::new(speech_to_text_from_settings(settings, transcoder)?),
            VisionInsightNormalizer::new(annotator_from_settings(settings)?),
            scenario,
            storyboard,
        )
        .with_snapshots(SnapshotStore::new(settings.data_dir.clone()))
        .with_max_clip_seconds(settings.max_clip_seconds))
    }

    /// Fetches the video, runs transcription and vision concurrently and
    /// stores a snapshot. Media is released before this returns.
    pub async fn analyze(&self, video_id: &str) -> Result<AnalysisResult> {
        let started = Instant::now();
        let media = self
            .acquirer
            .acquire(video_id, self.max_clip_seconds)
            .await
            .map_err(|e| e.within(Stage::Acquire, video_id))?;

        let transcribe = async {
            self.transcription
                .transcribe(media.audio_path())
                .await
                .map_err(|e| e.within(Stage::Transcribe, video_id))
        };
        let vision = async {
            match media.video_path() {
                Some(path) => self
                    .vision
                    .analyze(path)
                    .await
                    .map_err(|e| e.within(Stage::Vision, video_id)),
                None => {
                    warn!(video_id, "no playable video track, skipping visual analysis");
                    Ok(VisionInsights::default())
                }
            }
        };
        let (transcript, insights) = tokio::try_join!(transcribe, vision)?;
        drop(media);

        let analysis = AnalysisResult::new(transcript, insights);
        info!(
            video_id,
            segments = analysis.transcript.segments.len(),
            shots = analysis.shots.len(),
            key_objects = analysis.key_objects.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis complete"
        );

        if let Some(store) = &self.snapshots {
            if let Err(e) = store.save_analysis(video_id, &analysis).await {
                warn!(video_id, error = %e, "could not store analysis snapshot");
            }
        }
        Ok(analysis)
    }

    /// Analysis for `video_id`, from the snapshot store when `reuse` is set
    /// and a snapshot exists.
    pub async fn analysis(&self, video_id: &str, reuse: bool) -> Result<AnalysisResult> {
        if reuse {
            if let Some(store) = &self.snapshots {
                match store.load_analysis(video_id).await {
                    Ok(Some(analysis)) => {
                        info!(video_id, "reusing stored analysis");
                        return Ok(analysis);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(video_id, error = %e, "stored analysis unreadable, re-analysing"),
                }
            }
        }
        self.analyze(video_id).await
    }

    pub async fn synthesize(
        &self,
        video_id: &str,
        analysis: &AnalysisResult,
        topic: &str,
    ) -> Result<Scenario> {
        self.scenario
            .synthesize(video_id, analysis, topic)
            .await
            .map_err(|e| e.within(Stage::Scenario, video_id))
    }

    pub async fn scenario(&self, video_id: &str, topic: &str, reuse: bool) -> Result<Scenario> {
        let analysis = self.analysis(video_id, reuse).await?;
        self.synthesize(video_id, &analysis, topic).await
    }

    /// Plans a storyboard. `subject` names the run in logs and trail paths.
    pub async fn storyboard(
        &self,
        subject: &str,
        scenario: &Scenario,
        target: Target,
    ) -> Result<Storyboard> {
        self.storyboard
            .plan(subject, scenario, target)
            .await
            .map_err(|e| e.within(Stage::Storyboard, subject))
    }

    pub async fn run(&self, video_id: &str, topic: &str, target: Target) -> Result<PipelineOutput> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, video_id, %target);

        async {
            let analysis = self.analyze(video_id).await?;
            let scenario = self.synthesize(video_id, &analysis, topic).await?;
            let storyboard = self.storyboard(video_id, &scenario, target).await?;
            info!(
                scenes = storyboard.scenes.len(),
                total_duration_sec = storyboard.total_duration_sec,
                "run complete"
            );
            Ok(PipelineOutput {
                run_id,
                video_id: video_id.to_string(),
                analysis,
                scenario,
                storyboard,
            })
        }
        .instrument(span)
        .await
    }
}

/// The constrained generator for the configured provider, recording every
/// attempt under the data directory.
pub fn generator_from_settings(settings: &Settings) -> Result<Arc<ConstrainedGenerator>> {
    let config = settings.provider.config();
    let api_key = match settings.provider {
        Provider::Openai => settings.require_openai_key()?.to_string(),
        other => other.validate_api_key()?,
    };
    let model = ChatCompletionsClient::new(
        config.api_url,
        settings.llm_model.as_deref().unwrap_or(config.model),
        api_key,
        settings.llm_timeout,
    );
    info!(provider = settings.provider.name(), model = model.model(), "generative model ready");

    Ok(Arc::new(
        ConstrainedGenerator::new(Arc::new(model))
            .with_observer(Arc::new(JsonTrail::new(settings.data_dir.clone()))),
    ))
}

pub fn catalog_from_settings(settings: &Settings) -> Result<YoutubeDataApi> {
    Ok(YoutubeDataApi::new(
        settings.require_youtube_key()?,
        settings.http_timeout,
        settings.youtube_max_retries,
    ))
}

#[cfg(feature = "local-whisper")]
fn speech_to_text_from_settings(
    settings: &Settings,
    transcoder: Arc<FfmpegTranscoder>,
) -> Result<Arc<dyn SpeechToText>> {
    if let Some(model_path) = &settings.whisper_model_path {
        return Ok(Arc::new(crate::analysis::LocalWhisperTranscriber::new(
            model_path.clone(),
            transcoder,
        )));
    }
    hosted_speech_to_text(settings)
}

#[cfg(not(feature = "local-whisper"))]
fn speech_to_text_from_settings(
    settings: &Settings,
    _transcoder: Arc<FfmpegTranscoder>,
) -> Result<Arc<dyn SpeechToText>> {
    if settings.whisper_model_path.is_some() {
        warn!("WHISPER_MODEL_PATH is set but local-whisper is not compiled in, using hosted transcription");
    }
    hosted_speech_to_text(settings)
}

fn hosted_speech_to_text(settings: &Settings) -> Result<Arc<dyn SpeechToText>> {
    Ok(Arc::new(OpenAiTranscriber::new(
        settings.require_openai_key()?,
        settings.llm_timeout,
    )))
}

fn annotator_from_settings(settings: &Settings) -> Result<Arc<dyn VideoAnnotator>> {
    if let Some(token) = &settings.video_intelligence_token {
        return Ok(Arc::new(VideoIntelligenceClient::with_bearer_token(
            token.clone(),
            settings.vision_timeout,
        )));
    }
    if let Some(key) = &settings.google_api_key {
        return Ok(Arc::new(VideoIntelligenceClient::with_api_key(
            key.clone(),
            settings.vision_timeout,
        )));
    }
    Err(ReelsmithError::MissingApiKey {
        env_var: "VIDEO_INTELLIGENCE_TOKEN or GOOGLE_API_KEY".to_string(),
    })
}
