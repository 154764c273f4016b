// Downloader module - stream selection, concurrent fetch and remux pipeline

pub mod backends;
pub mod errors;
pub mod fetch;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod remux;
pub mod tools;
pub mod traits;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{BackendError, ErrorKind, FailureCategory, PipelineError, SelectionError};
pub use format_selector::{FormatSelector, Selection};
pub use models::{OutputKind, OutputRequest, StreamCatalog, StreamDescriptor, StreamKind};
pub use orchestrator::{Downloader, PipelineConfig, PipelineResult};
pub use traits::{RemuxEngine, Resolver, Transport};
