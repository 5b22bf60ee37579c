use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::transcription::{SegmentRecord, SpeechToText, TranscriptionResponse, VerboseTranscription};
use crate::{
    error::{ReelsmithError, Result},
    media::FfmpegTranscoder,
};

const CAPABILITY: &str = "local-whisper";

fn failed(reason: impl std::fmt::Display) -> ReelsmithError {
    ReelsmithError::Normalization {
        capability: CAPABILITY,
        reason: reason.to_string(),
    }
}

/// whisper.cpp running in-process. Audio is resampled to 16 kHz mono WAV in a
/// scratch directory before decoding.
pub struct LocalWhisperTranscriber {
    model_path: PathBuf,
    transcoder: Arc<FfmpegTranscoder>,
    use_gpu: bool,
}

impl LocalWhisperTranscriber {
    pub fn new(model_path: impl Into<PathBuf>, transcoder: Arc<FfmpegTranscoder>) -> Self {
        Self {
            model_path: model_path.into(),
            transcoder,
            use_gpu: cfg!(feature = "cuda"),
        }
    }

    fn run_model(model_path: &Path, wav_path: &Path, use_gpu: bool) -> Result<VerboseTranscription> {
        let mut reader = hound::WavReader::open(wav_path).map_err(failed)?;
        let samples: Vec<f32> = reader
            .samples::<i16>()
            .map(|s| s.map(|s| s as f32 / i16::MAX as f32))
            .collect::<std::result::Result<_, _>>()
            .map_err(failed)?;

        let ctx_params = WhisperContextParameters {
            use_gpu,
            flash_attn: use_gpu,
            ..Default::default()
        };
        let model_path_str = model_path
            .to_str()
            .ok_or_else(|| ReelsmithError::Config("whisper model path is not UTF-8".into()))?;
        let ctx = WhisperContext::new_with_params(model_path_str, ctx_params).map_err(failed)?;

        let params = FullParams::new(SamplingStrategy::Greedy { best_of: 5 });
        let mut state = ctx.create_state().map_err(failed)?;
        state.full(params, &samples).map_err(failed)?;

        let mut text = String::new();
        let mut segments = Vec::new();
        for segment in state.as_iter() {
            let Ok(seg_text) = segment.to_str() else {
                continue;
            };
            text.push_str(seg_text);
            segments.push(SegmentRecord {
                text: Some(seg_text.to_string()),
                start: Some(segment.start_timestamp() as f64 / 100.0),
                end: Some(segment.end_timestamp() as f64 / 100.0),
            });
        }

        let language_index = state.full_lang_id_from_state();
        let language = whisper_rs::get_lang_str(language_index).map(str::to_string);

        Ok(VerboseTranscription {
            text: Some(text),
            language,
            segments: Some(segments),
        })
    }
}

#[async_trait]
impl SpeechToText for LocalWhisperTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResponse> {
        let scratch = tempfile::Builder::new().prefix("reelsmith-wav-").tempdir()?;
        let wav_path = scratch.path().join("audio.wav");
        self.transcoder
            .resample_to_wav(audio_path, &wav_path)
            .await
            .map_err(failed)?;

        let model_path = self.model_path.clone();
        let use_gpu = self.use_gpu;
        let verbose = tokio::task::spawn_blocking(move || {
            Self::run_model(&model_path, &wav_path, use_gpu)
        })
        .await
        .map_err(failed)??;

        info!(
            segments = verbose.segments.as_ref().map(Vec::len).unwrap_or(0),
            "local whisper finished"
        );
        Ok(TranscriptionResponse::Native(verbose))
    }
}
