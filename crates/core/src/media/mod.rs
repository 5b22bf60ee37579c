mod acquire;
mod fetch;
mod transcode;

use std::{process::Output, time::Duration};

use tokio::process::Command;

use crate::error::AcquisitionError;

pub use acquire::{TransientMedia, TransientMediaAcquirer, canonical_url};
pub use fetch::{CobaltFetcher, FetchedMedia, MediaFetcher, YtDlpFetcher};
pub use transcode::{FfmpegTranscoder, Transcoder};

/// Runs an external program to completion, killing it once `timeout` passes.
pub(crate) async fn run_bounded(
    mut command: Command,
    program: &str,
    timeout: Duration,
) -> Result<Output, AcquisitionError> {
    command.kill_on_drop(true);
    match tokio::time::timeout(timeout, command.output()).await {
        Ok(output) => Ok(output?),
        Err(_) => Err(AcquisitionError::Timeout {
            program: program.to_string(),
            timeout_secs: timeout.as_secs(),
        }),
    }
}
