// Error types for the download pipeline

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::models::StreamRole;

/// Flat classification of every way a request can end badly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ResolutionFailed,
    NoVideoStream,
    NoAudioStream,
    DownloadFailed,
    MergeFailed,
    /// Never terminal, only logged
    CleanupFailed,
    Timeout,
}

/// What the user should look at, derived from the failing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// Selection stage: the resource has no usable streams
    NothingDownloadable,
    /// Resolution and fetch stages
    Network,
    /// Remux stage
    Muxing,
    Housekeeping,
}

impl ErrorKind {
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::NoVideoStream | Self::NoAudioStream => FailureCategory::NothingDownloadable,
            Self::ResolutionFailed | Self::DownloadFailed | Self::Timeout => {
                FailureCategory::Network
            }
            Self::MergeFailed => FailureCategory::Muxing,
            Self::CleanupFailed => FailureCategory::Housekeeping,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResolutionFailed => "ResolutionFailed",
            Self::NoVideoStream => "NoVideoStream",
            Self::NoAudioStream => "NoAudioStream",
            Self::DownloadFailed => "DownloadFailed",
            Self::MergeFailed => "MergeFailed",
            Self::CleanupFailed => "CleanupFailed",
            Self::Timeout => "Timeout",
        };
        f.write_str(name)
    }
}

/// Failure reported by a resolver or transport backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network timeout while talking to the remote site
    #[error("Network timeout: the remote site is not responding")]
    NetworkTimeout,

    /// Remote site refused the request (429, bot detection, etc.)
    #[error("Request blocked by the remote site: {0}")]
    Blocked(String),

    /// yt-dlp (or another helper binary) not found in system
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to parse tool output
    #[error("Parse error: {0}")]
    Parse(String),

    /// Command execution failed
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Classify raw tool stderr
impl From<String> for BackendError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();
        let timed_out = lower.contains("timeout") || lower.contains("timed out");

        // A timeout against the video host is almost always throttling
        if timed_out && (lower.contains("youtube.com") || lower.contains("googlevideo.com")) {
            return Self::Blocked(s);
        }

        if timed_out {
            return Self::NetworkTimeout;
        }

        if lower.contains("429") || lower.contains("bot") || lower.contains("blocked") {
            return Self::Blocked(s);
        }

        if lower.contains("command not found") || lower.contains("no such file") {
            return Self::ToolNotFound(s);
        }

        if lower.contains("invalid url") || lower.contains("unsupported url") {
            return Self::InvalidUrl(s);
        }

        if lower.contains("json") || lower.contains("parse") {
            return Self::Parse(s);
        }

        Self::Unknown(s)
    }
}

/// Remux engine failure with its diagnostic text
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EngineFailure {
    /// False when the engine process could not even be started
    pub attempted: bool,
    pub message: String,
}

impl EngineFailure {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            attempted: true,
            message: message.into(),
        }
    }

    pub fn not_attempted(message: impl Into<String>) -> Self {
        Self {
            attempted: false,
            message: message.into(),
        }
    }
}

/// Selector found nothing usable for at least one required role
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Nothing downloadable: {}", describe_missing(.missing))]
pub struct SelectionError {
    missing: Vec<StreamRole>,
}

impl SelectionError {
    /// `missing` lists every absent role, video before audio
    pub fn new(mut missing: Vec<StreamRole>) -> Self {
        missing.sort_by_key(|role| match role {
            StreamRole::Video => 0,
            StreamRole::Audio => 1,
        });
        missing.dedup();
        Self { missing }
    }

    pub fn missing(&self) -> &[StreamRole] {
        &self.missing
    }

    pub fn is_missing(&self, role: StreamRole) -> bool {
        self.missing.contains(&role)
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_missing(StreamRole::Video) {
            ErrorKind::NoVideoStream
        } else {
            ErrorKind::NoAudioStream
        }
    }
}

fn describe_missing(missing: &[StreamRole]) -> String {
    missing
        .iter()
        .map(|role| format!("no {}-only stream", role))
        .collect::<Vec<_>>()
        .join(" and ")
}

/// File removal that failed during cleanup; logged, never returned to the caller
#[derive(Debug, Error)]
#[error("could not remove {}", .path.display())]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl CleanupError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::CleanupFailed
    }
}

/// Terminal failure of one pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Could not resolve streams for {url}")]
    ResolutionFailed {
        url: String,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    NothingDownloadable(#[from] SelectionError),

    #[error("Could not prepare destination {}", .path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("The {role} download failed")]
    DownloadFailed {
        role: StreamRole,
        #[source]
        source: BackendError,
    },

    #[error("The {role} download timed out after {}s", .after.as_secs())]
    Timeout { role: StreamRole, after: Duration },

    #[error("Merging streams failed")]
    MergeFailed {
        #[source]
        source: EngineFailure,
    },

    #[error("Could not move {} to {}", .from.display(), .to.display())]
    PublishFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ResolutionFailed { .. } => ErrorKind::ResolutionFailed,
            Self::NothingDownloadable(e) => e.kind(),
            Self::Destination { .. } | Self::DownloadFailed { .. } => ErrorKind::DownloadFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::MergeFailed { .. } | Self::PublishFailed { .. } => ErrorKind::MergeFailed,
        }
    }

    /// Message followed by every underlying cause, separated by ": "
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut cause = self.source();
        while let Some(err) = cause {
            out.push_str(": ");
            out.push_str(&err.to_string());
            cause = err.source();
        }
        out
    }
}
