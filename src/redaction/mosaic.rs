use image::imageops::{self, FilterType};
use tracing::debug;

use crate::{
    detections::DetectionRecord,
    error::{RedactionError, Result},
    redaction::geometry::{PixelRect, Region},
    redaction::traits::{ApplyStats, Redact},
    video::types::Frame,
};

/// Pixelates the centered box region by shrinking it and scaling it back up
///
/// The region is the same `[cy - hh : cy + hh, cx - hw : cx + hw]` used by
/// [`GaussianBlur`](super::blur::GaussianBlur). It is resized with bilinear
/// filtering to `(w / scale, h / scale)` (each at least 1) and then restored
/// with nearest-neighbour, producing flat blocks.
#[derive(Debug, Clone)]
pub struct Mosaic {
    scale: u32,
}

impl Mosaic {
    pub fn new(scale: u32) -> Result<Self> {
        if scale == 0 {
            return Err(RedactionError::InvalidParameters {
                details: "mosaic scale must be positive".to_string(),
            }
            .into());
        }
        Ok(Self { scale })
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Downsampled size for a `width x height` region
    pub fn block_grid(&self, width: u32, height: u32) -> (u32, u32) {
        ((width / self.scale).max(1), (height / self.scale).max(1))
    }

    fn pixelate(&self, frame: &mut Frame, region: Region) {
        let (dw, dh) = self.block_grid(region.width, region.height);
        if dw == region.width && dh == region.height {
            return;
        }

        let patch = imageops::crop_imm(frame.as_image(), region.x, region.y, region.width, region.height)
            .to_image();
        let small = imageops::resize(&patch, dw, dh, FilterType::Triangle);
        let blocks = imageops::resize(&small, region.width, region.height, FilterType::Nearest);

        for (x, y, pixel) in blocks.enumerate_pixels() {
            frame.set_pixel(region.x + x, region.y + y, pixel.0);
        }
    }
}

impl Redact for Mosaic {
    fn name(&self) -> &str {
        "mosaic"
    }

    fn description(&self) -> &str {
        "Pixelated blocks over the centered detection region"
    }

    fn redact(&self, frame: &mut Frame, detections: &[&DetectionRecord]) -> ApplyStats {
        let mut stats = ApplyStats::default();

        for detection in detections {
            let rect = PixelRect::centered(&detection.bbox);
            let region = if rect.is_empty() {
                None
            } else {
                rect.clip(frame.width(), frame.height())
            };

            match region {
                Some(region) => {
                    self.pixelate(frame, region);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detections::BBox;
    use std::collections::HashSet;

    fn detection(x1: f64, y1: f64, x2: f64, y2: f64) -> DetectionRecord {
        DetectionRecord::new(0, 0, BBox::new(x1, y1, x2, y2))
    }

    fn gradient(width: u32, height: u32) -> Frame {
        let mut frame = Frame::new_black(width, height);
        for y in 0..height {
            for x in 0..width {
                frame.set_pixel(x, y, [(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8]);
            }
        }
        frame
    }

    #[test]
    fn test_zero_scale_rejected() {
        assert!(Mosaic::new(0).is_err());
        assert_eq!(Mosaic::new(50).unwrap().scale(), 50);
    }

    #[test]
    fn test_block_grid_is_at_least_one() {
        let mosaic = Mosaic::new(50).unwrap();
        assert_eq!(mosaic.block_grid(20, 120), (1, 2));
        assert_eq!(Mosaic::new(4).unwrap().block_grid(20, 10), (5, 2));
    }

    #[test]
    fn test_scale_one_is_identity() {
        let original = gradient(64, 64);
        let mut frame = original.clone();
        let mosaic = Mosaic::new(1).unwrap();

        let stats = mosaic.redact(&mut frame, &[&detection(5.0, 5.0, 40.0, 40.0)]);
        assert_eq!(stats.applied, 1);
        assert_eq!(frame, original);
    }

    #[test]
    fn test_pixelates_region_only() {
        let original = gradient(64, 64);
        let mut frame = original.clone();
        let mosaic = Mosaic::new(5).unwrap();

        mosaic.redact(&mut frame, &[&detection(10.0, 10.0, 30.0, 30.0)]);

        let region = Region {
            x: 10,
            y: 10,
            width: 20,
            height: 20,
        };
        let mut colors = HashSet::new();
        for y in 0..64 {
            for x in 0..64 {
                if region.contains(x, y) {
                    colors.insert(frame.get_pixel(x, y));
                } else {
                    assert_eq!(frame.get_pixel(x, y), original.get_pixel(x, y));
                }
            }
        }
        // 4 x 4 blocks at most
        assert!(colors.len() <= 16, "{} distinct colors", colors.len());
        assert_ne!(frame, original);
    }

    #[test]
    fn test_uniform_region_stays_uniform() {
        let original = Frame::new_filled(32, 32, [70, 80, 90]);
        let mut frame = original.clone();
        Mosaic::new(3)
            .unwrap()
            .redact(&mut frame, &[&detection(2.0, 2.0, 29.0, 29.0)]);
        assert_eq!(frame, original);
    }

    #[test]
    fn test_partially_outside_box_is_clipped() {
        let original = gradient(32, 32);
        let mut frame = original.clone();
        let stats = Mosaic::new(4)
            .unwrap()
            .redact(&mut frame, &[&detection(20.0, 20.0, 48.0, 48.0), &detection(40.0, 0.0, 60.0, 10.0)]);

        assert_eq!(stats.applied, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(frame.get_pixel(0, 0), original.get_pixel(0, 0));
        assert_ne!(frame, original);
    }
}
