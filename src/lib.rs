//! # Video Redactor
//!
//! Redact objects in a video using a pre-computed, per-frame detection table.
//!
//! The crate walks a video frame by frame, looks up each frame's detections,
//! applies one redaction style (outline, image overlay, blur or mosaic) to the
//! boxes of the targeted classes, and re-muxes the result with the original
//! audio track (or none).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use video_redactor::{
//!     config::Config,
//!     detections::TargetClasses,
//!     pipeline::{RedactionEngine, RedactionJob},
//!     redaction::StyleSpec,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut job = RedactionJob::new(
//!     "street.mp4",
//!     "detections.csv",
//!     "redacted.mp4",
//!     StyleSpec::Mosaic { scale: 20 },
//! );
//! job.targets = TargetClasses::new([0, 2]);
//!
//! let summary = RedactionEngine::new(Config::default()).run(&job).await?;
//! println!("{}", summary);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`detections`] - Detection records and the frame-indexed table
//! - [`redaction`] - Redaction styles and class filtering
//! - [`video`] - Probing, decoding, encoding and remux through FFmpeg
//! - [`pipeline`] - The frame loop and the run orchestrator
//! - [`config`] - Configuration management
//!
//! ## Driving the frame loop directly
//!
//! Any [`FrameSource`](video::FrameSource) / [`FrameSink`](video::FrameSink)
//! pair can be fed through [`FramePipeline`](pipeline::FramePipeline):
//!
//! ```rust,no_run
//! use video_redactor::{
//!     detections::{DetectionTable, TargetClasses},
//!     pipeline::FramePipeline,
//!     redaction::{Redactor, StyleSpec},
//!     video::{FrameSink, FrameSource},
//! };
//!
//! fn redact(
//!     source: &mut dyn FrameSource,
//!     sink: &mut dyn FrameSink,
//! ) -> video_redactor::Result<()> {
//!     let table = DetectionTable::load("detections.csv", None)?;
//!     let redactor = Redactor::from_spec(&StyleSpec::Rect, TargetClasses::default())?;
//!     FramePipeline::new(&table, &redactor).run(source, sink)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod detections;
pub mod error;
pub mod pipeline;
pub mod redaction;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    detections::{DetectionRecord, DetectionTable, TargetClasses},
    error::{RedactorError, Result},
    pipeline::{RedactionEngine, RedactionJob, RunSummary},
    redaction::{Redact, Redactor, StyleSpec},
};
