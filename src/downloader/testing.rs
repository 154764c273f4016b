// In-memory collaborators for pipeline tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::{BackendError, EngineFailure};
use super::models::{StreamCatalog, StreamDescriptor, StreamKind, VideoQuality};
use super::remux::RemuxCommand;
use super::traits::{RemuxEngine, Resolver, Transport};

pub fn video(id: &str, height: u32) -> StreamDescriptor {
    StreamDescriptor {
        id: id.to_string(),
        kind: StreamKind::VideoOnly {
            quality: VideoQuality::new(height, 30),
        },
        url: format!("https://media.example/{}", id),
        container: "mp4".to_string(),
        http_headers: BTreeMap::new(),
    }
}

pub fn audio(id: &str, kbps: u64) -> StreamDescriptor {
    StreamDescriptor {
        id: id.to_string(),
        kind: StreamKind::AudioOnly {
            bitrate: kbps * 1000,
        },
        url: format!("https://media.example/{}", id),
        container: "m4a".to_string(),
        http_headers: BTreeMap::new(),
    }
}

pub struct FakeResolver {
    catalog: Option<StreamCatalog>,
    pub calls: AtomicUsize,
}

impl FakeResolver {
    pub fn new(catalog: StreamCatalog) -> Self {
        Self {
            catalog: Some(catalog),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            catalog: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn resolve(&self, url: &str) -> Result<StreamCatalog, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.catalog
            .clone()
            .ok_or_else(|| BackendError::InvalidUrl(url.to_string()))
    }
}

/// Writes `<id>` into the destination. Streams listed in `failing` write a
/// partial file first and then fail.
#[derive(Default)]
pub struct FakeTransport {
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    pub started: Mutex<Vec<String>>,
    pub finished: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn fail(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn delay(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    pub fn started_count(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn download(
        &self,
        descriptor: &StreamDescriptor,
        dest: &Path,
    ) -> Result<u64, BackendError> {
        self.started.lock().unwrap().push(descriptor.id.clone());

        if let Some(delay) = self.delays.get(&descriptor.id) {
            tokio::time::sleep(*delay).await;
        }

        let result = if self.failing.contains(&descriptor.id) {
            tokio::fs::write(dest, b"partial").await?;
            Err(BackendError::HttpStatus {
                status: 403,
                url: descriptor.url.clone(),
            })
        } else {
            tokio::fs::write(dest, descriptor.id.as_bytes()).await?;
            Ok(descriptor.id.len() as u64)
        };

        self.finished.lock().unwrap().push(descriptor.id.clone());
        result
    }
}

/// Concatenates its inputs into the output, or fails after writing a stub
#[derive(Default)]
pub struct FakeEngine {
    failure: Option<String>,
    pub commands: Mutex<Vec<RemuxCommand>>,
}

impl FakeEngine {
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<RemuxCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemuxEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn run(&self, command: &RemuxCommand) -> Result<(), EngineFailure> {
        self.commands.lock().unwrap().push(command.clone());

        if let Some(message) = &self.failure {
            let _ = tokio::fs::write(&command.output, b"truncated").await;
            return Err(EngineFailure::failed(message.clone()));
        }

        let mut merged = Vec::new();
        for input in &command.inputs {
            let bytes = tokio::fs::read(input)
                .await
                .map_err(|e| EngineFailure::failed(e.to_string()))?;
            merged.extend_from_slice(&bytes);
        }
        tokio::fs::write(&command.output, merged)
            .await
            .map_err(|e| EngineFailure::failed(e.to_string()))
    }
}

/// File names in `dir`, sorted
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
