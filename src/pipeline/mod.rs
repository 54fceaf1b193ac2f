//! # Redaction Pipeline
//!
//! [`FramePipeline`] is the synchronous frame loop: decode, look up the
//! frame's detections, redact, encode. [`RedactionEngine`] wraps it with
//! everything around a run: tool checks, probing, table loading, scratch
//! space, and the final remux.

pub mod driver;
pub mod engine;

pub use driver::{FramePipeline, FrameStats, PipelineOutcome};
pub use engine::{RedactionEngine, RedactionJob, PipelineState, RunSummary};
