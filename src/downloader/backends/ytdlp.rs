// yt-dlp resolver - builds the stream catalog from `yt-dlp --dump-json`

use std::collections::BTreeMap;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::downloader::errors::BackendError;
use crate::downloader::models::{
    NetworkConfig, StreamCatalog, StreamDescriptor, StreamKind, VideoQuality,
};
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::traits::Resolver;
use crate::downloader::utils::{self, run_output_with_timeout};

/// Extra time granted to yt-dlp on top of its socket timeout
const EXTRACT_GRACE_SECS: u64 = 60;

pub struct YtDlpResolver {
    ytdlp_path: String,
    network: NetworkConfig,
}

impl YtDlpResolver {
    pub fn new(network: NetworkConfig) -> Self {
        let ytdlp_path = ToolManager::new()
            .get_tool_info(ToolType::YtDlp)
            .path
            .unwrap_or_else(|| ToolType::YtDlp.as_str().to_string());
        Self::with_path(ytdlp_path, network)
    }

    pub fn with_path(ytdlp_path: impl Into<String>, network: NetworkConfig) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            network,
        }
    }

    /// Build command arguments
    fn build_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];
        args.extend(utils::get_timeout_args(&self.network));
        args.extend(utils::get_proxy_args(&self.network));
        args.push(url.to_string());
        args
    }

    fn process_timeout(&self) -> u64 {
        self.network.timeout.map(u64::from).unwrap_or(30) + EXTRACT_GRACE_SECS
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve(&self, url: &str) -> Result<StreamCatalog, BackendError> {
        if url.is_empty() {
            return Err(BackendError::InvalidUrl("empty URL".to_string()));
        }

        let args = self.build_args(url);
        tracing::debug!(program = %self.ytdlp_path, args = %args.join(" "), "running resolver");

        let output =
            run_output_with_timeout(&self.ytdlp_path, &args, Some(self.process_timeout())).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(if stderr.is_empty() {
                BackendError::Execution(format!("yt-dlp exited with {}", output.status))
            } else {
                BackendError::from(stderr)
            });
        }

        parse_catalog(&output.stdout)
    }
}

/// Parse a `--dump-json` document into a catalog
pub fn parse_catalog(stdout: &[u8]) -> Result<StreamCatalog, BackendError> {
    let json: Value = serde_json::from_slice(stdout)
        .map_err(|e| BackendError::Parse(format!("Invalid JSON: {}", e)))?;

    let formats = json["formats"]
        .as_array()
        .ok_or_else(|| BackendError::Parse("No formats array in JSON".to_string()))?;

    let title = json["title"].as_str().unwrap_or("Unknown").to_string();
    let streams = formats.iter().filter_map(parse_format).collect();

    Ok(StreamCatalog::new(title, streams))
}

fn is_absent(codec: Option<&str>) -> bool {
    codec.map_or(true, |c| c == "none" || c.is_empty())
}

/// Video-only and audio-only formats become descriptors; muxed ones are skipped
fn parse_format(f: &Value) -> Option<StreamDescriptor> {
    let url = f["url"].as_str()?;
    let vcodec = f["vcodec"].as_str();
    let acodec = f["acodec"].as_str();

    let kind = match (is_absent(vcodec), is_absent(acodec)) {
        (false, true) => StreamKind::VideoOnly {
            quality: video_quality(f)?,
        },
        (true, false) => StreamKind::AudioOnly {
            bitrate: audio_bitrate(f)?,
        },
        _ => return None,
    };

    let http_headers = f["http_headers"]
        .as_object()
        .map(|headers| {
            headers
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_else(BTreeMap::new);

    Some(StreamDescriptor {
        id: f["format_id"].as_str().unwrap_or("").to_string(),
        kind,
        url: url.to_string(),
        container: f["ext"].as_str().unwrap_or("").to_string(),
        http_headers,
    })
}

fn video_quality(f: &Value) -> Option<VideoQuality> {
    let fps = f["fps"].as_f64().map(|fps| fps.round() as u32);

    if let Some(height) = f["height"].as_u64() {
        return Some(VideoQuality::new(height as u32, fps.unwrap_or(0)));
    }

    // e.g. "1080p60", "720p"
    lazy_static::lazy_static! {
        static ref NOTE_RE: Regex = Regex::new(r"(\d{3,4})p(\d{2,3})?").unwrap();
    }

    let note = f["format_note"].as_str()?;
    let caps = NOTE_RE.captures(note)?;
    let height = caps.get(1)?.as_str().parse().ok()?;
    let note_fps = caps.get(2).and_then(|m| m.as_str().parse().ok());
    Some(VideoQuality::new(height, fps.or(note_fps).unwrap_or(0)))
}

/// Bits per second, from `abr` (kbps) or failing that `tbr`
fn audio_bitrate(f: &Value) -> Option<u64> {
    let kbps = f["abr"].as_f64().or_else(|| f["tbr"].as_f64())?;
    Some((kbps * 1000.0).round() as u64)
}
