// Pipeline controller - one request in, one file (or one failure) out
//
// Resolving -> Selecting -> Fetching -> Remuxing -> Done | Failed
//
// The controller holds no per-request state, so a single `Downloader` can
// serve any number of sequential or concurrent requests. It never retries.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::errors::PipelineError;
use super::fetch::FetchCoordinator;
use super::format_selector::{FormatSelector, Selection};
use super::models::OutputRequest;
use super::remux;
use super::traits::{RemuxEngine, Resolver, Transport};
use super::utils;

/// Terminal value of one run: the final file, or the single reason it failed
pub type PipelineResult = Result<PathBuf, PipelineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Resolving,
    Selecting,
    Fetching,
    Remuxing,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Resolving => "resolving",
            Self::Selecting => "selecting",
            Self::Fetching => "fetching",
            Self::Remuxing => "remuxing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Where output goes and how long a single fetch may take
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub destination_dir: PathBuf,
    /// None waits indefinitely
    pub fetch_timeout: Option<Duration>,
}

impl PipelineConfig {
    pub fn new(destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            destination_dir: destination_dir.into(),
            fetch_timeout: None,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let documents = dirs::document_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(documents.join("TubeDL"))
    }
}

pub struct Downloader {
    resolver: Arc<dyn Resolver>,
    transport: Arc<dyn Transport>,
    engine: Arc<dyn RemuxEngine>,
    config: PipelineConfig,
}

impl Downloader {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        transport: Arc<dyn Transport>,
        engine: Arc<dyn RemuxEngine>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            resolver,
            transport,
            engine,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one request to a terminal state
    pub async fn run(&self, request: &OutputRequest) -> PipelineResult {
        let mut state = PipelineState::Start;
        let result = self.drive(request, &mut state).await;

        match &result {
            Ok(path) => {
                transition(&mut state, PipelineState::Done);
                tracing::info!(path = %path.display(), "download complete");
            }
            Err(err) => {
                tracing::error!(
                    stage = %state,
                    kind = %err.kind(),
                    error = %err.report(),
                    "download failed"
                );
                transition(&mut state, PipelineState::Failed);
            }
        }

        result
    }

    async fn drive(&self, request: &OutputRequest, state: &mut PipelineState) -> PipelineResult {
        let url = request.resource_url.trim();

        transition(state, PipelineState::Resolving);
        tracing::info!(url, resolver = self.resolver.name(), "resolving streams");
        let catalog = self
            .resolver
            .resolve(url)
            .await
            .map_err(|source| PipelineError::ResolutionFailed {
                url: url.to_string(),
                source,
            })?;
        tracing::debug!(title = %catalog.title, streams = catalog.streams.len(), "catalog resolved");

        transition(state, PipelineState::Selecting);
        let selection = FormatSelector::select(&catalog, request.output_kind)?;
        log_selection(&selection);

        let base_name = request
            .destination_base_name
            .as_deref()
            .unwrap_or(&catalog.title);
        let final_path = self.final_path(base_name, request.output_kind.extension());
        let scratch = utils::scratch_base(&final_path);

        transition(state, PipelineState::Fetching);
        self.prepare_destination().await?;
        let fetched = match FetchCoordinator::new(self.transport.as_ref())
            .with_deadline(self.config.fetch_timeout)
            .fetch(&selection, &scratch)
            .await
        {
            Ok(fetched) => fetched,
            Err(failure) => {
                utils::remove_artifacts(&failure.temp_paths).await;
                return Err(failure.error);
            }
        };

        transition(state, PipelineState::Remuxing);
        let result = remux::remux(
            &fetched,
            request.output_kind,
            &final_path,
            &scratch,
            self.engine.as_ref(),
        )
        .await;

        if result.is_err() {
            // remux cleans up after itself; this only covers files it never saw
            utils::remove_artifacts(&fetched.temp_paths()).await;
        }

        result
    }

    fn final_path(&self, base_name: &str, extension: &str) -> PathBuf {
        let file_name = format!("{}.{}", utils::sanitize_file_name(base_name), extension);
        self.config.destination_dir.join(file_name)
    }

    async fn prepare_destination(&self) -> Result<(), PipelineError> {
        let dir: &Path = &self.config.destination_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| PipelineError::Destination {
                path: dir.to_path_buf(),
                source,
            })
    }
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    tracing::debug!(from = %state, to = %next, "pipeline state");
    *state = next;
}

fn log_selection(selection: &Selection) {
    for (role, descriptor) in selection.parts() {
        tracing::info!(%role, stream = %descriptor, "selected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::errors::ErrorKind;
    use crate::downloader::models::{OutputKind, StreamCatalog};
    use crate::downloader::remux::TrackCodec;
    use crate::downloader::testing::{
        audio, dir_entries, video, FakeEngine, FakeResolver, FakeTransport,
    };
    use std::sync::atomic::Ordering;

    struct Harness {
        resolver: Arc<FakeResolver>,
        transport: Arc<FakeTransport>,
        engine: Arc<FakeEngine>,
        downloader: Downloader,
    }

    fn harness(
        resolver: FakeResolver,
        transport: FakeTransport,
        engine: FakeEngine,
        dir: &Path,
    ) -> Harness {
        let resolver = Arc::new(resolver);
        let transport = Arc::new(transport);
        let engine = Arc::new(engine);
        let downloader = Downloader::new(
            resolver.clone(),
            transport.clone(),
            engine.clone(),
            PipelineConfig::new(dir),
        );
        Harness {
            resolver,
            transport,
            engine,
            downloader,
        }
    }

    fn request(kind: OutputKind) -> OutputRequest {
        OutputRequest::new("https://www.youtube.com/watch?v=abc", kind)
    }

    #[tokio::test]
    async fn audio_video_request_merges_best_streams() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = StreamCatalog::new(
            "My Clip",
            vec![video("v480", 480), video("v1080", 1080), audio("a128", 128)],
        );
        let h = harness(
            FakeResolver::new(catalog),
            FakeTransport::default(),
            FakeEngine::default(),
            dir.path(),
        );

        let path = h.downloader.run(&request(OutputKind::AudioVideo)).await.unwrap();

        assert_eq!(path, dir.path().join("My Clip.mp4"));
        assert_eq!(std::fs::read(&path).unwrap(), b"v1080a128");
        assert_eq!(dir_entries(dir.path()), vec!["My Clip.mp4"]);

        let commands = h.engine.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].video, TrackCodec::Copy);
        assert_eq!(commands[0].audio, TrackCodec::Encode("aac".to_string()));
    }

    #[tokio::test]
    async fn audio_request_renames_without_engine() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = StreamCatalog::new("Song", vec![audio("a64", 64), audio("a160", 160)]);
        let h = harness(
            FakeResolver::new(catalog),
            FakeTransport::default(),
            FakeEngine::default(),
            dir.path(),
        );

        let path = h.downloader.run(&request(OutputKind::AudioOnly)).await.unwrap();

        assert_eq!(path, dir.path().join("Song.mp3"));
        assert_eq!(std::fs::read(&path).unwrap(), b"a160");
        assert!(h.engine.commands().is_empty());
        assert_eq!(dir_entries(dir.path()), vec!["Song.mp3"]);
    }

    #[tokio::test]
    async fn missing_audio_fails_before_any_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = StreamCatalog::new("Mute", vec![video("v720", 720)]);
        let h = harness(
            FakeResolver::new(catalog),
            FakeTransport::default(),
            FakeEngine::default(),
            dir.path(),
        );

        let err = h.downloader.run(&request(OutputKind::AudioVideo)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NoAudioStream);
        assert_eq!(h.transport.started_count(), 0);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn failed_audio_fetch_removes_written_video() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = StreamCatalog::new("Clip", vec![video("v720", 720), audio("a128", 128)]);
        let h = harness(
            FakeResolver::new(catalog),
            FakeTransport::default()
                .fail("a128")
                .delay("v720", Duration::from_millis(30)),
            FakeEngine::default(),
            dir.path(),
        );

        let err = h.downloader.run(&request(OutputKind::AudioVideo)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DownloadFailed);
        assert_eq!(h.transport.finished(), vec!["a128", "v720"]);
        assert!(h.engine.commands().is_empty());
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn merge_failure_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = StreamCatalog::new("Clip", vec![video("v720", 720), audio("a128", 128)]);
        let h = harness(
            FakeResolver::new(catalog),
            FakeTransport::default(),
            FakeEngine::failing("Invalid data found when processing input"),
            dir.path(),
        );

        let err = h.downloader.run(&request(OutputKind::AudioVideo)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MergeFailed);
        assert!(err.report().contains("Invalid data found"));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn resolution_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(
            FakeResolver::failing(),
            FakeTransport::default(),
            FakeEngine::default(),
            dir.path(),
        );

        let err = h.downloader.run(&request(OutputKind::AudioOnly)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ResolutionFailed);
        assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.transport.started_count(), 0);
    }

    #[tokio::test]
    async fn fetch_timeout_cleans_up_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = StreamCatalog::new("Slow", vec![video("v720", 720), audio("a128", 128)]);
        let resolver = Arc::new(FakeResolver::new(catalog));
        let transport =
            Arc::new(FakeTransport::default().delay("v720", Duration::from_secs(5)));
        let downloader = Downloader::new(
            resolver,
            transport.clone(),
            Arc::new(FakeEngine::default()),
            PipelineConfig::new(dir.path()).with_fetch_timeout(Some(Duration::from_millis(50))),
        );

        let err = downloader.run(&request(OutputKind::AudioVideo)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(transport.finished(), vec!["a128"]);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn base_name_override_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = StreamCatalog::new("Ignored", vec![audio("a128", 128)]);
        let h = harness(
            FakeResolver::new(catalog),
            FakeTransport::default(),
            FakeEngine::default(),
            &dir.path().join("nested"),
        );

        let req = request(OutputKind::AudioOnly).with_base_name(Some("mix: part 1/2".to_string()));
        let path = h.downloader.run(&req).await.unwrap();

        assert_eq!(path, dir.path().join("nested").join("mix part 12.mp3"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn repeated_runs_pick_the_same_streams() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = StreamCatalog::new(
            "Again",
            vec![video("first", 1080), video("second", 1080), audio("a", 128)],
        );
        let h = harness(
            FakeResolver::new(catalog),
            FakeTransport::default(),
            FakeEngine::default(),
            dir.path(),
        );

        h.downloader.run(&request(OutputKind::AudioVideo)).await.unwrap();
        h.downloader.run(&request(OutputKind::AudioVideo)).await.unwrap();

        let started = h.transport.started.lock().unwrap().clone();
        assert_eq!(started, vec!["first", "a", "first", "a"]);
        assert_eq!(h.engine.commands().len(), 2);
        assert_eq!(
            std::fs::read(dir.path().join("Again.mp4")).unwrap(),
            b"firsta"
        );
    }

    #[tokio::test]
    async fn concurrent_requests_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let song = Arc::new(FakeResolver::new(StreamCatalog::new("One", vec![audio("a1", 128)])));
        let clip = Arc::new(FakeResolver::new(StreamCatalog::new(
            "Two",
            vec![video("v2", 720), audio("a2", 128)],
        )));
        let transport = Arc::new(FakeTransport::default());
        let engine = Arc::new(FakeEngine::default());
        let first = Downloader::new(song, transport.clone(), engine.clone(), PipelineConfig::new(dir.path()));
        let second = Downloader::new(clip, transport, engine, PipelineConfig::new(dir.path()));

        let song_request = request(OutputKind::AudioOnly);
        let clip_request = request(OutputKind::AudioVideo);
        let (a, b) = tokio::join!(first.run(&song_request), second.run(&clip_request));

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(dir_entries(dir.path()), vec!["One.mp3", "Two.mp4"]);
    }

    #[tokio::test]
    async fn same_title_requests_keep_their_own_streams() {
        let dir = tempfile::tempdir().unwrap();
        let first_catalog = StreamCatalog::new("Same", vec![video("v1", 720), audio("a1", 128)]);
        let second_catalog = StreamCatalog::new("Same", vec![video("v2", 720), audio("a2", 128)]);
        let transport = Arc::new(
            FakeTransport::default()
                .delay("v1", Duration::from_millis(50))
                .delay("a2", Duration::from_millis(50)),
        );
        let engine = Arc::new(FakeEngine::default());
        let first = Downloader::new(
            Arc::new(FakeResolver::new(first_catalog)),
            transport.clone(),
            engine.clone(),
            PipelineConfig::new(dir.path()),
        );
        let second = Downloader::new(
            Arc::new(FakeResolver::new(second_catalog)),
            transport,
            engine.clone(),
            PipelineConfig::new(dir.path()),
        );

        let req = request(OutputKind::AudioVideo);
        let (a, b) = tokio::join!(first.run(&req), second.run(&req));

        assert!(a.is_ok());
        assert!(b.is_ok());
        let commands = engine.commands();
        assert_eq!(commands.len(), 2);
        assert_ne!(commands[0].inputs, commands[1].inputs);
        assert_ne!(commands[0].output, commands[1].output);
        // Whichever finished last owns the file, but never a mix of both
        let merged = std::fs::read(dir.path().join("Same.mp4")).unwrap();
        assert!(merged == b"v1a1" || merged == b"v2a2");
        assert_eq!(dir_entries(dir.path()), vec!["Same.mp4"]);
    }

    #[tokio::test]
    async fn merge_failure_keeps_previous_download() {
        let dir = tempfile::tempdir().unwrap();
        let previous = dir.path().join("Clip.mp4");
        std::fs::write(&previous, b"earlier good download").unwrap();
        let catalog = StreamCatalog::new("Clip", vec![video("v720", 720), audio("a128", 128)]);
        let h = harness(
            FakeResolver::new(catalog),
            FakeTransport::default(),
            FakeEngine::failing("Invalid data found when processing input"),
            dir.path(),
        );

        let err = h.downloader.run(&request(OutputKind::AudioVideo)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MergeFailed);
        assert_eq!(std::fs::read(&previous).unwrap(), b"earlier good download");
        assert_eq!(dir_entries(dir.path()), vec!["Clip.mp4"]);
    }
}
