use crate::{detections::DetectionRecord, video::types::Frame};

/// Core trait implemented by every redaction variant
pub trait Redact: Send + Sync {
    /// Returns the unique name of this style
    fn name(&self) -> &str;

    /// Returns a human-readable description of this style
    fn description(&self) -> &str;

    /// Redact `frame` in place
    ///
    /// # Arguments
    ///
    /// * `frame` - The decoded frame to modify
    /// * `detections` - Detections of this frame already restricted to the target classes,
    ///   in table order
    ///
    /// Regions are clipped to the frame; a detection whose region is empty after
    /// clipping is skipped and counted in the returned stats.
    fn redact(&self, frame: &mut Frame, detections: &[&DetectionRecord]) -> ApplyStats;
}

/// Bookkeeping for one strategy application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Detections that changed (or were drawn onto) the frame
    pub applied: usize,

    /// Detections skipped because their region was degenerate
    pub skipped: usize,

    /// Detections ignored because their class is not targeted
    pub filtered_out: usize,
}

impl ApplyStats {
    pub fn merge(&mut self, other: ApplyStats) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.filtered_out += other.filtered_out;
    }
}
