// Collaborator traits the pipeline is built against

use std::path::Path;

use async_trait::async_trait;

use super::errors::{BackendError, EngineFailure};
use super::models::{StreamCatalog, StreamDescriptor};
use super::remux::RemuxCommand;

/// Turns a resource URL into its stream catalog
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    async fn resolve(&self, url: &str) -> Result<StreamCatalog, BackendError>;
}

/// Moves the bytes of one stream into a local file
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Download `descriptor` to `dest`, returning the number of bytes written.
    ///
    /// On failure `dest` may or may not exist.
    async fn download(&self, descriptor: &StreamDescriptor, dest: &Path)
        -> Result<u64, BackendError>;
}

/// External muxer, invoked once per audio+video request
#[async_trait]
pub trait RemuxEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, command: &RemuxCommand) -> Result<(), EngineFailure>;
}
