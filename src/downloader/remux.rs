// Remux orchestration - turns fetched artifacts into the final file
//
// Audio-only requests need no muxer: the fetched audio is moved into place.
// Audio+video requests run the engine once with the video track copied and
// the audio track re-encoded to AAC, which every mp4 player accepts.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::errors::{EngineFailure, PipelineError};
use super::fetch::Fetched;
use super::models::OutputKind;
use super::traits::RemuxEngine;
use super::utils;

/// Audio codec used when muxing audio+video
pub const MERGE_AUDIO_CODEC: &str = "aac";

/// Per-track codec policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackCodec {
    /// Stream copy, no re-encode
    Copy,
    Encode(String),
}

impl TrackCodec {
    fn as_arg(&self) -> &str {
        match self {
            Self::Copy => "copy",
            Self::Encode(codec) => codec,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    Video,
    Audio,
}

/// Take track `track` of type `track_type` from input number `input`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackMapping {
    pub input: usize,
    pub track_type: TrackType,
    pub track: usize,
}

impl TrackMapping {
    fn as_arg(&self) -> String {
        let kind = match self.track_type {
            TrackType::Video => "v",
            TrackType::Audio => "a",
        };
        format!("{}:{}:{}", self.input, kind, self.track)
    }
}

/// Declarative description of one engine invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemuxCommand {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub video: TrackCodec,
    pub audio: TrackCodec,
    pub mapping: Vec<TrackMapping>,
}

impl RemuxCommand {
    /// Video copied from the first input, audio encoded from the second
    pub fn merge(video: &Path, audio: &Path, output: &Path) -> Self {
        Self {
            inputs: vec![video.to_path_buf(), audio.to_path_buf()],
            output: output.to_path_buf(),
            video: TrackCodec::Copy,
            audio: TrackCodec::Encode(MERGE_AUDIO_CODEC.to_string()),
            mapping: vec![
                TrackMapping {
                    input: 0,
                    track_type: TrackType::Video,
                    track: 0,
                },
                TrackMapping {
                    input: 1,
                    track_type: TrackType::Audio,
                    track: 0,
                },
            ],
        }
    }

    /// ffmpeg command line for this invocation
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y"]
            .iter()
            .map(OsString::from)
            .collect();

        for input in &self.inputs {
            args.push("-i".into());
            args.push(input.as_os_str().to_os_string());
        }

        for mapping in &self.mapping {
            args.push("-map".into());
            args.push(mapping.as_arg().into());
        }

        args.push("-c:v".into());
        args.push(self.video.as_arg().into());
        args.push("-c:a".into());
        args.push(self.audio.as_arg().into());

        // Older ffmpeg builds gate the native aac encoder behind this flag
        if self.audio == TrackCodec::Encode(MERGE_AUDIO_CODEC.to_string()) {
            args.push("-strict".into());
            args.push("experimental".into());
        }

        args.push(self.output.as_os_str().to_os_string());
        args
    }
}

/// Produce `final_path` from the fetched artifacts.
///
/// Intermediate files are removed on every path out of this function. The
/// engine writes to a part file named after `scratch`, which only replaces
/// `final_path` once the merge succeeded.
pub async fn remux(
    fetched: &Fetched,
    output_kind: OutputKind,
    final_path: &Path,
    scratch: &Path,
    engine: &dyn RemuxEngine,
) -> Result<PathBuf, PipelineError> {
    let temp_paths = fetched.temp_paths();

    let result = match (output_kind, fetched) {
        (OutputKind::AudioOnly, Fetched::Audio(job)) => {
            tracing::info!(
                from = %job.local_temp_path.display(),
                to = %final_path.display(),
                "publishing audio"
            );
            publish(&job.local_temp_path, final_path).await
        }
        (OutputKind::AudioVideo, Fetched::AudioVideo { video, audio }) => {
            let part = utils::part_path_for(scratch, output_kind.extension());
            let command =
                RemuxCommand::merge(&video.local_temp_path, &audio.local_temp_path, &part);
            let merged = match merge(&command, engine).await {
                Ok(()) => publish(&part, final_path).await,
                Err(e) => Err(e),
            };
            utils::remove_artifacts(&[&part]).await;
            merged
        }
        (kind, fetched) => Err(PipelineError::MergeFailed {
            source: EngineFailure::not_attempted(format!(
                "{} output requested but {} artifact(s) were fetched",
                kind,
                fetched.temp_paths().len()
            )),
        }),
    };

    // Deletion failures are logged inside and never change the outcome
    utils::remove_artifacts(&temp_paths).await;

    result
}

async fn publish(from: &Path, to: &Path) -> Result<PathBuf, PipelineError> {
    utils::move_file(from, to)
        .await
        .map(|()| to.to_path_buf())
        .map_err(|source| PipelineError::PublishFailed {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        })
}

async fn merge(command: &RemuxCommand, engine: &dyn RemuxEngine) -> Result<(), PipelineError> {
    for input in &command.inputs {
        if tokio::fs::metadata(input).await.is_err() {
            return Err(PipelineError::MergeFailed {
                source: EngineFailure::not_attempted(format!(
                    "missing input {}",
                    input.display()
                )),
            });
        }
    }

    tracing::info!(engine = engine.name(), output = %command.output.display(), "merging streams");
    tracing::debug!(?command, "remux command");

    engine
        .run(command)
        .await
        .map_err(|source| PipelineError::MergeFailed { source })
}
