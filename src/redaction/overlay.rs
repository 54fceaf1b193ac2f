use std::path::{Path, PathBuf};

use image::RgbaImage;
use tracing::{debug, info};

use crate::{
    detections::DetectionRecord,
    error::{RedactionError, Result},
    redaction::geometry::{PixelRect, Region},
    redaction::traits::{ApplyStats, Redact},
    video::types::Frame,
};

/// Alpha-composites one overlay image into every detection box
///
/// The overlay is decoded once at construction. Per frame, detections are
/// painted in ascending bbox-area order, so where boxes overlap the larger
/// box ends up on top.
#[derive(Debug, Clone)]
pub struct ImageOverlay {
    overlay: RgbaImage,
    source: Option<PathBuf>,
}

impl ImageOverlay {
    /// Decode the overlay image; any failure is reported as a missing asset
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let missing = |reason: String| RedactionError::OverlayAssetMissing {
            path: path.display().to_string(),
            reason,
        };

        if !path.is_file() {
            return Err(missing("file does not exist".to_string()).into());
        }

        let overlay = image::open(path).map_err(|e| missing(e.to_string()))?.to_rgba8();
        if overlay.width() == 0 || overlay.height() == 0 {
            return Err(missing("image is empty".to_string()).into());
        }

        info!(
            "Loaded overlay {:?} ({}x{})",
            path,
            overlay.width(),
            overlay.height()
        );
        Ok(Self {
            overlay,
            source: Some(path.to_path_buf()),
        })
    }

    pub fn from_image(overlay: RgbaImage) -> Self {
        Self {
            overlay,
            source: None,
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Paint order: ascending unrounded bbox area, ties keep table order
    pub fn stacking_order<'a>(detections: &[&'a DetectionRecord]) -> Vec<&'a DetectionRecord> {
        let mut ordered = detections.to_vec();
        ordered.sort_by(|a, b| a.bbox.area().total_cmp(&b.bbox.area()));
        ordered
    }

    /// Paint only the visible window, sampling the overlay as if it were
    /// stretched over the whole, unclipped rectangle
    fn composite(&self, frame: &mut Frame, rect: PixelRect, visible: Region) {
        let (overlay_width, overlay_height) = self.overlay.dimensions();
        if overlay_width == 0 || overlay_height == 0 {
            return;
        }

        let columns = taps(visible.x, visible.width, rect.left, rect.width(), overlay_width);
        let rows = taps(visible.y, visible.height, rect.top, rect.height(), overlay_height);

        for (y, row) in (visible.y..).zip(&rows) {
            for (x, column) in (visible.x..).zip(&columns) {
                let src = self.sample(*column, *row);
                let alpha = src[3] as f32 / 255.0;

                let dst = frame.get_pixel_mut(x, y);
                for c in 0..3 {
                    dst[c] = blend(src[c], dst[c], alpha);
                }
            }
        }
    }

    /// Bilinear lookup, rounded back to 8-bit levels
    fn sample(&self, column: Tap, row: Tap) -> [u8; 4] {
        let top_left = self.overlay.get_pixel(column.lo, row.lo).0;
        let top_right = self.overlay.get_pixel(column.hi, row.lo).0;
        let bottom_left = self.overlay.get_pixel(column.lo, row.hi).0;
        let bottom_right = self.overlay.get_pixel(column.hi, row.hi).0;

        let mut out = [0u8; 4];
        for c in 0..4 {
            let top = lerp(top_left[c] as f32, top_right[c] as f32, column.t);
            let bottom = lerp(bottom_left[c] as f32, bottom_right[c] as f32, column.t);
            out[c] = lerp(top, bottom, row.t).round().clamp(0.0, 255.0) as u8;
        }
        out
    }
}

/// Overlay source positions for one axis of the visible window
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tap {
    lo: u32,
    hi: u32,
    t: f32,
}

/// Map `count` frame pixels starting at `start` into an overlay axis of
/// `source_len` texels stretched over `extent` pixels beginning at `origin`
///
/// Pixel centers are aligned, so equal sizes map one to one.
fn taps(start: u32, count: u32, origin: i64, extent: i64, source_len: u32) -> Vec<Tap> {
    let scale = source_len as f64 / extent.max(1) as f64;
    let last = source_len.saturating_sub(1) as f64;

    (0..count)
        .map(|i| {
            let offset = (start as f64 + i as f64) - origin as f64;
            let pos = ((offset + 0.5) * scale - 0.5).clamp(0.0, last);
            let lo = pos.floor();
            Tap {
                lo: lo as u32,
                hi: (lo + 1.0).min(last) as u32,
                t: (pos - lo) as f32,
            }
        })
        .collect()
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// `alpha * overlay + (1 - alpha) * background`, rounded to the nearest level
pub fn blend(overlay: u8, background: u8, alpha: f32) -> u8 {
    let value = alpha * overlay as f32 + (1.0 - alpha) * background as f32;
    value.round().clamp(0.0, 255.0) as u8
}

impl Redact for ImageOverlay {
    fn name(&self) -> &str {
        "image"
    }

    fn description(&self) -> &str {
        "Alpha-composited image resized into each detection box"
    }

    fn redact(&self, frame: &mut Frame, detections: &[&DetectionRecord]) -> ApplyStats {
        let mut stats = ApplyStats::default();

        for detection in Self::stacking_order(detections) {
            let rect = PixelRect::from_corners(&detection.bbox);
            let visible = if rect.is_empty() {
                None
            } else {
                rect.clip(frame.width(), frame.height())
            };

            match visible {
                Some(visible) => {
                    self.composite(frame, rect, visible);
                    stats.applied += 1;
                }
                None => {
                    debug!("{}", RedactionError::DegenerateRegion { frame_id: detection.frame_id });
                    stats.skipped += 1;
                }
            }
        }

        stats
    }
}
