//! Command line surface: argument parsing and the interactive request loop.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::downloader::backends::{FfmpegEngine, HttpTransport, YtDlpResolver};
use crate::downloader::models::NetworkConfig;
use crate::downloader::tools::ToolManager;
use crate::downloader::{
    Downloader, FailureCategory, OutputKind, OutputRequest, PipelineConfig, PipelineResult,
};

#[derive(Debug, Parser)]
#[command(name = "tubedl")]
#[command(about = "Download a video (MP4) or its audio (MP3) from a URL")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub download: DownloadArgs,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show whether yt-dlp and ffmpeg are installed
    Tools,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FileType {
    Mp3,
    Mp4,
}

impl From<FileType> for OutputKind {
    fn from(file_type: FileType) -> Self {
        match file_type {
            FileType::Mp3 => OutputKind::AudioOnly,
            FileType::Mp4 => OutputKind::AudioVideo,
        }
    }
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Video URL; omit to enter URLs interactively
    pub url: Option<String>,

    /// Output file type
    #[arg(short, long, value_enum, default_value = "mp4")]
    pub format: FileType,

    /// Destination directory [default: <Documents>/TubeDL]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output file name without extension [default: video title]
    #[arg(short, long)]
    pub name: Option<String>,

    /// Proxy URL for resolving and downloading (e.g. socks5://127.0.0.1:1080)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Network socket timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub socket_timeout: u32,

    /// Give up on a single stream download after this many seconds
    #[arg(long)]
    pub fetch_timeout: Option<u64>,

    /// Path to the yt-dlp binary
    #[arg(long)]
    pub ytdlp: Option<String>,

    /// Path to the ffmpeg binary
    #[arg(long)]
    pub ffmpeg: Option<String>,
}

impl DownloadArgs {
    fn network(&self) -> NetworkConfig {
        NetworkConfig {
            proxy: self.proxy.clone(),
            timeout: Some(self.socket_timeout),
        }
    }

    fn pipeline(&self) -> PipelineConfig {
        let config = match &self.output {
            Some(dir) => PipelineConfig::new(dir),
            None => PipelineConfig::default(),
        };
        config.with_fetch_timeout(self.fetch_timeout.map(Duration::from_secs))
    }

    /// Wire the real backends into a pipeline
    pub fn build_downloader(&self) -> Result<Downloader> {
        let network = self.network();

        let resolver = match &self.ytdlp {
            Some(path) => YtDlpResolver::with_path(path.clone(), network.clone()),
            None => YtDlpResolver::new(network.clone()),
        };
        let transport = HttpTransport::new(&network).context("failed to build HTTP client")?;
        let engine = match &self.ffmpeg {
            Some(path) => FfmpegEngine::with_path(path.clone()),
            None => FfmpegEngine::new(),
        };

        Ok(Downloader::new(
            Arc::new(resolver),
            Arc::new(transport),
            Arc::new(engine),
            self.pipeline(),
        ))
    }
}

/// Execute CLI command - separated for testing.
///
/// A failed download has already been reported on stdout, so it only shows
/// up in the exit code.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Some(Commands::Tools) => {
            print_tools(&mut std::io::stdout())?;
            Ok(ExitCode::SUCCESS)
        }
        None => {
            let args = cli.download;
            let downloader = args.build_downloader()?;

            match &args.url {
                Some(url) => {
                    let request = OutputRequest::new(url.clone(), args.format.into())
                        .with_base_name(args.name.clone());
                    let result =
                        download_once(&downloader, &request, &mut std::io::stdout()).await?;
                    Ok(if result.is_ok() {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    })
                }
                None => {
                    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
                    interactive_loop(&downloader, stdin, &mut std::io::stdout()).await?;
                    Ok(ExitCode::SUCCESS)
                }
            }
        }
    }
}

/// Run one request and print its outcome
pub async fn download_once<W: Write>(
    downloader: &Downloader,
    request: &OutputRequest,
    out: &mut W,
) -> std::io::Result<PipelineResult> {
    let result = downloader.run(request).await;
    print_result(out, &result)?;
    Ok(result)
}

fn print_tools<W: Write>(out: &mut W) -> Result<()> {
    for tool in ToolManager::new().get_all_tools() {
        let status = if tool.is_available { "found" } else { "MISSING" };
        writeln!(
            out,
            "{:<8} {:<8} {} ({})",
            tool.name,
            status,
            tool.path.as_deref().unwrap_or("-"),
            tool.version.as_deref().unwrap_or("unknown version"),
        )?;
        if !tool.is_available {
            writeln!(out, "         needed for {}", tool.tool_type.purpose())?;
        }
    }
    Ok(())
}

/// Render a terminal pipeline result for the user
pub fn print_result<W: Write>(out: &mut W, result: &PipelineResult) -> std::io::Result<()> {
    match result {
        Ok(path) => writeln!(out, "Download completed: {}", path.display()),
        Err(err) => {
            let headline = match err.kind().category() {
                FailureCategory::NothingDownloadable => "Nothing to download",
                FailureCategory::Network => "Video download failed",
                FailureCategory::Muxing => "Error merging streams",
                FailureCategory::Housekeeping => "Cleanup problem",
            };
            writeln!(out, "{} [{}]: {}", headline, err.kind(), err.report())
        }
    }
}

/// Prompt for a URL and file type, run the pipeline, repeat until EOF
pub async fn interactive_loop<R, W>(downloader: &Downloader, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();

    writeln!(out, "Welcome to TubeDL (Command Line Interface)")?;
    writeln!(
        out,
        "Downloads video & audio files to {}",
        downloader.config().destination_dir.display()
    )?;

    loop {
        writeln!(out)?;
        writeln!(out, "-------------------------")?;
        writeln!(out)?;
        writeln!(out, "Enter video url: ")?;
        out.flush()?;

        let Some(url) = lines.next_line().await? else {
            break;
        };
        let url = url.trim().to_string();
        if url.is_empty() {
            continue;
        }

        writeln!(out, "Select file type (MP4/MP3): ")?;
        out.flush()?;
        let Some(answer) = lines.next_line().await? else {
            break;
        };

        let output_kind = OutputKind::parse_file_type(&answer).unwrap_or_else(|| {
            let _ = writeln!(out, "Invalid file type selected. Defaulting to MP4.");
            OutputKind::AudioVideo
        });

        writeln!(out, "Attempting to download video as {}", output_kind)?;
        download_once(downloader, &OutputRequest::new(url, output_kind), out).await?;
    }

    Ok(())
}
