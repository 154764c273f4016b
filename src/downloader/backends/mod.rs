// Concrete resolver, transport and remux engine

pub mod ffmpeg;
pub mod http;
pub mod ytdlp;

pub use ffmpeg::FfmpegEngine;
pub use http::HttpTransport;
pub use ytdlp::YtDlpResolver;
