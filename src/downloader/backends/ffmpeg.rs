// ffmpeg remux engine

use async_trait::async_trait;

use crate::downloader::errors::EngineFailure;
use crate::downloader::remux::RemuxCommand;
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::traits::RemuxEngine;
use crate::downloader::utils::{run_output_with_timeout, ProcessError};

/// Lines of stderr kept in the failure message
const DIAGNOSTIC_LINES: usize = 8;

pub struct FfmpegEngine {
    ffmpeg_path: String,
    timeout_secs: Option<u64>,
}

impl FfmpegEngine {
    pub fn new() -> Self {
        let ffmpeg_path = ToolManager::new()
            .get_tool_info(ToolType::Ffmpeg)
            .path
            .unwrap_or_else(|| ToolType::Ffmpeg.as_str().to_string());
        Self::with_path(ffmpeg_path)
    }

    pub fn with_path(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemuxEngine for FfmpegEngine {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn run(&self, command: &RemuxCommand) -> Result<(), EngineFailure> {
        let args = command.to_args();
        tracing::debug!(program = %self.ffmpeg_path, ?args, "running ffmpeg");

        let output = run_output_with_timeout(&self.ffmpeg_path, &args, self.timeout_secs)
            .await
            .map_err(|e| match e {
                ProcessError::Spawn { .. } => EngineFailure::not_attempted(e.to_string()),
                other => EngineFailure::failed(other.to_string()),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(EngineFailure::failed(diagnostic_tail(
            &stderr,
            &format!("ffmpeg exited with {}", output.status),
        )))
    }
}

/// Last few non-empty stderr lines, or `fallback` when there are none
fn diagnostic_tail(stderr: &str, fallback: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if lines.is_empty() {
        return fallback.to_string();
    }

    let start = lines.len().saturating_sub(DIAGNOSTIC_LINES);
    lines[start..].join("\n")
}
