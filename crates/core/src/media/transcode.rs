use std::{ffi::OsString, path::Path, time::Duration};

use async_trait::async_trait;
use tokio::process::Command;

use super::run_bounded;
use crate::error::AcquisitionError;

/// Turns fetched media into the audio artifacts the analysis stage reads.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Writes at most `max_seconds` of audio from `input` to `output` as mp3.
    async fn extract_audio(
        &self,
        input: &Path,
        output: &Path,
        max_seconds: u32,
    ) -> Result<(), AcquisitionError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "ffmpeg".to_string(),
            timeout,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn audio_args(input: &Path, output: &Path, max_seconds: u32) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-ss", "0", "-t"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(max_seconds.to_string().into());
        args.push("-i".into());
        args.push(input.as_os_str().to_owned());
        for arg in ["-vn", "-acodec", "libmp3lame", "-ar", "44100", "-ac", "2", "-b:a", "192k"] {
            args.push(arg.into());
        }
        args.push(output.as_os_str().to_owned());
        args
    }

    fn wav_args(input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.as_os_str().to_owned()];
        for arg in ["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"] {
            args.push(arg.into());
        }
        args.push(output.as_os_str().to_owned());
        args
    }

    async fn run(&self, input: &Path, args: Vec<OsString>) -> Result<(), AcquisitionError> {
        let mut command = Command::new(&self.program);
        command.args(args);

        let output = run_bounded(command, &self.program, self.timeout).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AcquisitionError::Transcode {
                input: input.to_path_buf(),
                status: output.status.to_string(),
                stderr: crate::error::truncate_body(stderr.trim()),
            });
        }
        Ok(())
    }

    /// Resamples to 16 kHz mono PCM WAV, the input format whisper.cpp expects.
    pub async fn resample_to_wav(&self, input: &Path, output: &Path) -> Result<(), AcquisitionError> {
        self.run(input, Self::wav_args(input, output)).await
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn extract_audio(
        &self,
        input: &Path,
        output: &Path,
        max_seconds: u32,
    ) -> Result<(), AcquisitionError> {
        self.run(input, Self::audio_args(input, output, max_seconds))
            .await
    }
}
