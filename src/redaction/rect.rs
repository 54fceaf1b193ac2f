use tracing::debug;

use crate::{
    detections::DetectionRecord,
    error::RedactionError,
    redaction::geometry::PixelRect,
    redaction::traits::{ApplyStats, Redact},
    video::types::Frame,
};

/// Outline stroke width in pixels
pub const STROKE_WIDTH: i64 = 2;

/// Outline color (blue)
pub const OUTLINE_COLOR: [u8; 3] = [0, 0, 255];

/// Draws an unfilled outline around each detection
///
/// The outline spans `(round(x1), round(y1))` to `(round(x2), round(y2))`
/// inclusive and the stroke grows inward from those edges, so nothing
/// strictly inside `(x1 + 2, y1 + 2)-(x2 - 2, y2 - 2)` is touched.
#[derive(Debug, Clone, Default)]
pub struct RectOutline;

impl RectOutline {
    pub fn new() -> Self {
        Self
    }

    /// Fill the inclusive span `[x0, x1] x [y0, y1]`, clipped to the frame
    fn fill_clipped(frame: &mut Frame, x0: i64, x1: i64, y0: i64, y1: i64) {
        let max_x = frame.width() as i64 - 1;
        let max_y = frame.height() as i64 - 1;
        let (x0, x1) = (x0.max(0), x1.min(max_x));
        let (y0, y1) = (y0.max(0), y1.min(max_y));
        if x0 > x1 || y0 > y1 {
            return;
        }

        for y in y0..=y1 {
            for x in x0..=x1 {
                frame.set_pixel(x as u32, y as u32, OUTLINE_COLOR);
            }
        }
    }

    fn draw_outline(frame: &mut Frame, rect: PixelRect) {
        let PixelRect { left, top, right, bottom } = rect;
        let inset = STROKE_WIDTH - 1;

        Self::fill_clipped(frame, left, right, top, top + inset);
        Self::fill_clipped(frame, left, right, bottom - inset, bottom);
        Self::fill_clipped(frame, left, left + inset, top, bottom);
        Self::fill_clipped(frame, right - inset, right, top, bottom);
    }
}

impl Redact for RectOutline {
    fn name(&self) -> &str {
        "rect"
    }

    fn description(&self) -> &str {
        "Unfilled rectangle outline around each detection"
    }

    fn redact(&self, frame: &mut Frame, detections: &[&DetectionRecord]) -> ApplyStats {
        let mut stats = ApplyStats::default();

        for detection in detections {
            let rect = PixelRect::from_corners(&detection.bbox);
            // Corners are inclusive, so the drawn span is one pixel wider than the rect
            let span = PixelRect::new(rect.left, rect.top, rect.right + 1, rect.bottom + 1);
            if span.clip(frame.width(), frame.height()).is_none() {
                debug!("{}", RedactionError::DegenerateRegion { frame_id: detection.frame_id });
                stats.skipped += 1;
                continue;
            }

            Self::draw_outline(frame, rect);
            stats.applied += 1;
        }

        stats
    }
}
