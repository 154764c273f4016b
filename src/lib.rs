//! Fetch a remote video as MP4, or just its audio as MP3.
//!
//! The [`downloader`] module holds the pipeline: stream selection, concurrent
//! fetching of the video and audio streams, and remuxing with ffmpeg. The
//! [`cli`] module is the command line surface around it.

pub mod cli;
pub mod downloader;
