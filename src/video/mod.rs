//! # Video Module
//!
//! Probing, frame-by-frame decoding and encoding, and final remux. All heavy
//! lifting is delegated to the `ffmpeg` and `ffprobe` command-line tools;
//! frames travel between them and the pipeline as packed RGB24 over pipes.

pub mod command;
pub mod finalizer;
pub mod probe;
pub mod sink;
pub mod source;
pub mod types;

pub use command::{check_tool_available, FfmpegCommand};
pub use finalizer::{default_preview_path, Finalizer};
pub use probe::{has_audio_stream, probe_video};
pub use sink::{FfmpegFrameSink, FrameSink};
pub use source::{FfmpegFrameSource, FrameSource};
pub use types::{Frame, VideoInfo};
