// Common data models for the download pipeline

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Ordinal video quality: height first, frame rate breaks ties (1080p60 > 1080p30).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoQuality {
    pub height: u32,
    pub fps: u32,
}

impl VideoQuality {
    pub fn new(height: u32, fps: u32) -> Self {
        Self { height, fps }
    }
}

impl Ord for VideoQuality {
    fn cmp(&self, other: &Self) -> Ordering {
        self.height
            .cmp(&other.height)
            .then(self.fps.cmp(&other.fps))
    }
}

impl PartialOrd for VideoQuality {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fps > 30 {
            write!(f, "{}p{}", self.height, self.fps)
        } else {
            write!(f, "{}p", self.height)
        }
    }
}

/// Media kind of a single representation, with the quality metric that only
/// makes sense for that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    VideoOnly { quality: VideoQuality },
    /// Bitrate in bits per second
    AudioOnly { bitrate: u64 },
}

/// One encoded representation of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Format ID (e.g., "137", "140")
    pub id: String,
    pub kind: StreamKind,
    /// Direct media URL handed to the transport
    pub url: String,
    /// Container extension reported by the source (mp4, webm, m4a)
    pub container: String,
    /// Request headers the source expects for `url`
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
}

impl StreamDescriptor {
    pub fn video_quality(&self) -> Option<VideoQuality> {
        match self.kind {
            StreamKind::VideoOnly { quality } => Some(quality),
            StreamKind::AudioOnly { .. } => None,
        }
    }

    pub fn audio_bitrate(&self) -> Option<u64> {
        match self.kind {
            StreamKind::AudioOnly { bitrate } => Some(bitrate),
            StreamKind::VideoOnly { .. } => None,
        }
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StreamKind::VideoOnly { quality } => {
                write!(f, "{} (video {}, {})", self.id, quality, self.container)
            }
            StreamKind::AudioOnly { bitrate } => {
                write!(f, "{} (audio {} kbps, {})", self.id, bitrate / 1000, self.container)
            }
        }
    }
}

/// Snapshot of every representation available for one resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamCatalog {
    pub title: String,
    pub streams: Vec<StreamDescriptor>,
}

impl StreamCatalog {
    pub fn new(title: impl Into<String>, streams: Vec<StreamDescriptor>) -> Self {
        Self {
            title: title.into(),
            streams,
        }
    }
}

/// What the user wants on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputKind {
    AudioOnly,
    AudioVideo,
}

impl OutputKind {
    /// Extension of the final container
    pub fn extension(&self) -> &'static str {
        match self {
            Self::AudioOnly => "mp3",
            Self::AudioVideo => "mp4",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::AudioOnly => "MP3",
            Self::AudioVideo => "MP4",
        }
    }

    /// Parse a user-typed file type ("mp3", " MP4 "). Unknown input yields `None`.
    pub fn parse_file_type(input: &str) -> Option<Self> {
        match input.trim().to_uppercase().as_str() {
            "MP3" => Some(Self::AudioOnly),
            "MP4" => Some(Self::AudioVideo),
            _ => None,
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single download request
#[derive(Debug, Clone)]
pub struct OutputRequest {
    pub resource_url: String,
    pub output_kind: OutputKind,
    /// Overrides the resource title as the output file name
    pub destination_base_name: Option<String>,
}

impl OutputRequest {
    pub fn new(resource_url: impl Into<String>, output_kind: OutputKind) -> Self {
        Self {
            resource_url: resource_url.into(),
            output_kind,
            destination_base_name: None,
        }
    }

    pub fn with_base_name(mut self, name: Option<String>) -> Self {
        self.destination_base_name = name;
        self
    }
}

/// Which track a fetched artifact provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamRole {
    Video,
    Audio,
}

impl StreamRole {
    /// Suffix appended to the final path for this role's temp file
    pub fn temp_suffix(&self) -> &'static str {
        match self {
            Self::Video => "video.tmp",
            Self::Audio => "audio.tmp",
        }
    }
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => f.write_str("video"),
            Self::Audio => f.write_str("audio"),
        }
    }
}

/// A descriptor bound to the temp file it is downloaded into
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub role: StreamRole,
    pub descriptor: StreamDescriptor,
    pub local_temp_path: PathBuf,
}

/// Network configuration for backends
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// SOCKS5/HTTP proxy URL (e.g., "socks5://127.0.0.1:1080")
    pub proxy: Option<String>,

    /// Timeout in seconds
    pub timeout: Option<u32>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: Some(30),
        }
    }
}
