use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::{
    detections::DetectionTable,
    error::{RedactorError, Result},
    redaction::{ApplyStats, Redactor},
    video::{FrameSink, FrameSource},
};

/// Counters for one pass over the source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames handed to the sink
    pub frames_written: u64,

    /// Frames on which at least one detection was applied
    pub frames_redacted: u64,

    pub detections_applied: u64,

    /// Detections skipped for degenerate regions
    pub detections_skipped: u64,

    /// Detections ignored because their class is not targeted
    pub detections_filtered: u64,

    /// Frame id at which decoding stopped short of the reported frame count
    pub truncated_at: Option<u64>,
}

impl FrameStats {
    fn record(&mut self, applied: ApplyStats) {
        if applied.applied > 0 {
            self.frames_redacted += 1;
        }
        self.detections_applied += applied.applied as u64;
        self.detections_skipped += applied.skipped as u64;
        self.detections_filtered += applied.filtered_out as u64;
    }
}

/// How a pass over the source ended
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Every readable frame was written and the sink was finished
    Completed(FrameStats),

    /// Preview mode stopped at the first frame with detections
    Previewed {
        frame_id: u64,
        path: PathBuf,
        stats: FrameStats,
    },
}

impl PipelineOutcome {
    pub fn stats(&self) -> &FrameStats {
        match self {
            Self::Completed(stats) => stats,
            Self::Previewed { stats, .. } => stats,
        }
    }
}

/// Sequential decode -> redact -> encode loop
///
/// Frames are read in order from `0` to the reported frame count and written
/// in the same order with no gaps; frames without detections pass through
/// unchanged. A failed read ends the loop early without failing the run.
pub struct FramePipeline<'a> {
    table: &'a DetectionTable,
    redactor: &'a Redactor,
    preview: Option<PathBuf>,
    progress: ProgressBar,
}

impl<'a> FramePipeline<'a> {
    pub fn new(table: &'a DetectionTable, redactor: &'a Redactor) -> Self {
        Self {
            table,
            redactor,
            preview: None,
            progress: ProgressBar::hidden(),
        }
    }

    /// Stop at the first frame with detections and save it to `path` instead
    /// of producing a video
    pub fn with_preview(mut self, path: impl AsRef<Path>) -> Self {
        self.preview = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(&self, source: &mut dyn FrameSource, sink: &mut dyn FrameSink) -> Result<PipelineOutcome> {
        let frame_count = source.info().frame_count;
        let mut stats = FrameStats::default();

        self.progress.set_length(frame_count);
        info!(
            "Processing {} frames with {} style, targets {}",
            frame_count,
            self.redactor.name(),
            self.redactor.targets()
        );

        for frame_id in 0..frame_count {
            let mut frame = match source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    warn!("Source ended at frame {} of {}", frame_id, frame_count);
                    stats.truncated_at = Some(frame_id);
                    break;
                }
                Err(e) if e.is_recoverable() => {
                    warn!("{}; finishing with {} frames", e, frame_id);
                    stats.truncated_at = Some(frame_id);
                    break;
                }
                Err(e) => return Err(self.abort(source, e)),
            };

            let detections = self.table.lookup(frame_id);
            if !detections.is_empty() {
                let applied = self.redactor.apply(&mut frame, detections);
                debug!(
                    "Frame {}: {} applied, {} skipped, {} filtered",
                    frame_id, applied.applied, applied.skipped, applied.filtered_out
                );
                stats.record(applied);

                if let Some(path) = &self.preview {
                    frame.save_png(path).map_err(|e| {
                        RedactorError::generic(format!("failed to save preview {:?}: {}", path, e))
                    })?;
                    self.progress.finish_and_clear();
                    source.close()?;
                    info!("Preview of frame {} saved to {:?}", frame_id, path);
                    return Ok(PipelineOutcome::Previewed {
                        frame_id,
                        path: path.clone(),
                        stats,
                    });
                }
            }

            if let Err(e) = sink.write_frame(&frame) {
                return Err(self.abort(source, e));
            }
            stats.frames_written += 1;
            self.progress.inc(1);
        }

        self.progress.finish_and_clear();
        source.close()?;
        sink.finish()?;

        info!(
            "Wrote {} frames ({} redacted, {} detections applied, {} skipped)",
            stats.frames_written, stats.frames_redacted, stats.detections_applied, stats.detections_skipped
        );
        Ok(PipelineOutcome::Completed(stats))
    }

    fn abort(&self, source: &mut dyn FrameSource, error: RedactorError) -> RedactorError {
        self.progress.abandon();
        if let Err(e) = source.close() {
            debug!("Failed to close source after error: {}", e);
        }
        error
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::detections::{BBox, DetectionRecord, TargetClasses};
    use crate::error::VideoError;
    use crate::redaction::rect::OUTLINE_COLOR;
    use crate::redaction::StyleSpec;
    use crate::video::{Frame, VideoInfo};
    use tempfile::tempdir;

    /// In-memory source yielding synthetic frames, optionally failing at one index
    pub(crate) struct MemorySource {
        pub info: VideoInfo,
        pub frames: Vec<Frame>,
        pub fail_at: Option<u64>,
        pub next: usize,
        pub closed: bool,
    }

    impl MemorySource {
        pub fn new(frames: Vec<Frame>) -> Self {
            let info = VideoInfo {
                width: frames[0].width(),
                height: frames[0].height(),
                fps: 25.0,
                frame_count: frames.len() as u64,
            };
            Self {
                info,
                frames,
                fail_at: None,
                next: 0,
                closed: false,
            }
        }
    }

    impl FrameSource for MemorySource {
        fn info(&self) -> &VideoInfo {
            &self.info
        }

        fn read_frame(&mut self) -> Result<Option<Frame>> {
            if self.fail_at == Some(self.next as u64) {
                return Err(VideoError::FrameReadFailed {
                    frame_id: self.next as u64,
                    reason: "corrupt packet".to_string(),
                }
                .into());
            }
            let frame = self.frames.get(self.next).cloned();
            self.next += 1;
            Ok(frame)
        }

        fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct MemorySink {
        pub frames: Vec<Frame>,
        pub finished: bool,
    }

    impl FrameSink for MemorySink {
        fn write_frame(&mut self, frame: &Frame) -> Result<()> {
            self.frames.push(frame.clone());
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    /// Ten 64x64 frames, each a distinct flat gray
    pub(crate) fn synthetic_frames() -> Vec<Frame> {
        (0..10u8)
            .map(|i| Frame::new_filled(64, 64, [i * 20, i * 20 + 5, i * 20 + 10]))
            .collect()
    }

    fn rect_redactor(targets: &[u32]) -> Redactor {
        Redactor::from_spec(&StyleSpec::Rect, TargetClasses::new(targets.iter().copied())).unwrap()
    }

    fn single_detection_table(cls: u32) -> DetectionTable {
        DetectionTable::from_records(vec![DetectionRecord::new(5, cls, BBox::new(10.0, 10.0, 30.0, 30.0))])
    }

    #[test]
    fn test_end_to_end_rect() {
        let frames = synthetic_frames();
        let table = single_detection_table(2);
        let redactor = rect_redactor(&[2]);

        let mut source = MemorySource::new(frames.clone());
        let mut sink = MemorySink::default();
        let outcome = FramePipeline::new(&table, &redactor).run(&mut source, &mut sink).unwrap();

        assert_eq!(sink.frames.len(), 10);
        assert!(sink.finished);
        assert!(source.closed);

        for (i, (out, input)) in sink.frames.iter().zip(&frames).enumerate() {
            if i != 5 {
                assert_eq!(out, input, "frame {} changed", i);
            }
        }

        let redacted = &sink.frames[5];
        for y in 0..64 {
            for x in 0..64 {
                let on_border = (10..=30).contains(&x)
                    && (10..=30).contains(&y)
                    && (x <= 11 || x >= 29 || y <= 11 || y >= 29);
                if on_border {
                    assert_eq!(redacted.get_pixel(x, y), OUTLINE_COLOR);
                } else {
                    assert_eq!(redacted.get_pixel(x, y), frames[5].get_pixel(x, y));
                }
            }
        }

        let stats = outcome.stats();
        assert_eq!(stats.frames_written, 10);
        assert_eq!(stats.frames_redacted, 1);
        assert_eq!(stats.truncated_at, None);
    }

    #[test]
    fn test_read_failure_truncates_and_finishes() {
        let table = single_detection_table(0);
        let redactor = rect_redactor(&[0]);

        let mut source = MemorySource::new(synthetic_frames());
        source.fail_at = Some(3);
        let mut sink = MemorySink::default();

        let outcome = FramePipeline::new(&table, &redactor).run(&mut source, &mut sink).unwrap();

        assert_eq!(sink.frames.len(), 3);
        assert!(sink.finished);
        assert_eq!(outcome, PipelineOutcome::Completed(*outcome.stats()));
        assert_eq!(outcome.stats().truncated_at, Some(3));
    }

    #[test]
    fn test_short_source_stops_at_end() {
        let table = DetectionTable::from_records(Vec::new());
        let redactor = rect_redactor(&[0]);

        let mut source = MemorySource::new(synthetic_frames());
        source.info.frame_count = 12;
        let mut sink = MemorySink::default();

        let outcome = FramePipeline::new(&table, &redactor).run(&mut source, &mut sink).unwrap();
        assert_eq!(sink.frames.len(), 10);
        assert_eq!(outcome.stats().truncated_at, Some(10));
    }

    #[test]
    fn test_non_target_frames_pass_through() {
        let frames = synthetic_frames();
        let table = single_detection_table(7);
        let redactor = rect_redactor(&[0, 1]);

        let mut source = MemorySource::new(frames.clone());
        let mut sink = MemorySink::default();
        let outcome = FramePipeline::new(&table, &redactor).run(&mut source, &mut sink).unwrap();

        assert_eq!(sink.frames, frames);
        assert_eq!(outcome.stats().detections_filtered, 1);
        assert_eq!(outcome.stats().frames_redacted, 0);
    }

    #[test]
    fn test_preview_stops_before_writing() {
        let dir = tempdir().unwrap();
        let preview = dir.path().join("preview.png");
        let table = single_detection_table(0);
        let redactor = rect_redactor(&[0]);

        let mut source = MemorySource::new(synthetic_frames());
        let mut sink = MemorySink::default();
        let outcome = FramePipeline::new(&table, &redactor)
            .with_preview(&preview)
            .run(&mut source, &mut sink)
            .unwrap();

        match outcome {
            PipelineOutcome::Previewed { frame_id, path, .. } => {
                assert_eq!(frame_id, 5);
                assert_eq!(path, preview);
            }
            other => panic!("expected preview, got {:?}", other),
        }

        assert_eq!(sink.frames.len(), 5);
        assert!(!sink.finished);
        assert!(source.closed);

        let saved = image::open(&preview).unwrap().to_rgb8();
        assert_eq!(saved.get_pixel(10, 10).0, OUTLINE_COLOR);
    }
}
