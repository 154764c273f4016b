// Fetch coordination - downloads the selected streams into temp files
//
// Two-stream requests download video and audio concurrently and always wait
// for both to finish, even when one fails early, so that every temp file that
// may have been written is known to the caller and can be removed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::PipelineError;
use super::format_selector::Selection;
use super::models::{FetchJob, StreamDescriptor, StreamRole};
use super::traits::Transport;
use super::utils;

/// Artifacts of a fully successful fetch
#[derive(Debug, Clone)]
pub enum Fetched {
    Audio(FetchJob),
    AudioVideo { video: FetchJob, audio: FetchJob },
}

impl Fetched {
    pub fn jobs(&self) -> Vec<&FetchJob> {
        match self {
            Self::Audio(job) => vec![job],
            Self::AudioVideo { video, audio } => vec![video, audio],
        }
    }

    pub fn temp_paths(&self) -> Vec<PathBuf> {
        self.jobs()
            .into_iter()
            .map(|job| job.local_temp_path.clone())
            .collect()
    }
}

/// A failed fetch, with every temp path that may exist on disk
#[derive(Debug)]
pub struct FetchFailure {
    pub error: PipelineError,
    pub temp_paths: Vec<PathBuf>,
}

pub type FetchOutcome = Result<Fetched, FetchFailure>;

pub struct FetchCoordinator<'a> {
    transport: &'a dyn Transport,
    deadline: Option<Duration>,
}

impl<'a> FetchCoordinator<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self {
            transport,
            deadline: None,
        }
    }

    /// Bound each individual download by `deadline`
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Download everything in `selection` to temp files named after `scratch`
    pub async fn fetch(&self, selection: &Selection, scratch: &Path) -> FetchOutcome {
        match selection {
            Selection::Audio(audio) => {
                let job = make_job(StreamRole::Audio, audio, scratch);
                match self.run_job(&job).await {
                    Ok(()) => Ok(Fetched::Audio(job)),
                    Err(error) => Err(FetchFailure {
                        error,
                        temp_paths: vec![job.local_temp_path],
                    }),
                }
            }
            Selection::AudioVideo { video, audio } => {
                let video_job = make_job(StreamRole::Video, video, scratch);
                let audio_job = make_job(StreamRole::Audio, audio, scratch);

                // Join, not select: a failure on one side must not cancel the other
                let (video_result, audio_result) =
                    tokio::join!(self.run_job(&video_job), self.run_job(&audio_job));

                let temp_paths = vec![
                    video_job.local_temp_path.clone(),
                    audio_job.local_temp_path.clone(),
                ];

                match (video_result, audio_result) {
                    (Ok(()), Ok(())) => Ok(Fetched::AudioVideo {
                        video: video_job,
                        audio: audio_job,
                    }),
                    (Err(error), Ok(())) | (Ok(()), Err(error)) => {
                        Err(FetchFailure { error, temp_paths })
                    }
                    (Err(error), Err(other)) => {
                        tracing::warn!(error = %other.report(), "audio download also failed");
                        Err(FetchFailure { error, temp_paths })
                    }
                }
            }
        }
    }

    async fn run_job(&self, job: &FetchJob) -> Result<(), PipelineError> {
        tracing::info!(
            role = %job.role,
            stream = %job.descriptor,
            transport = self.transport.name(),
            "fetching"
        );

        let download = self
            .transport
            .download(&job.descriptor, &job.local_temp_path);

        let result = match self.deadline {
            Some(after) => match tokio::time::timeout(after, download).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(role = %job.role, secs = after.as_secs(), "fetch deadline hit");
                    return Err(PipelineError::Timeout {
                        role: job.role,
                        after,
                    });
                }
            },
            None => download.await,
        };

        match result {
            Ok(bytes) => {
                tracing::info!(role = %job.role, bytes, "fetched");
                Ok(())
            }
            Err(source) => {
                tracing::warn!(role = %job.role, error = %source, "fetch failed");
                Err(PipelineError::DownloadFailed {
                    role: job.role,
                    source,
                })
            }
        }
    }
}

fn make_job(role: StreamRole, descriptor: &StreamDescriptor, scratch: &Path) -> FetchJob {
    FetchJob {
        role,
        descriptor: descriptor.clone(),
        local_temp_path: utils::temp_path_for(scratch, role),
    }
}
