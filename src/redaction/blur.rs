use rayon::prelude::*;
use tracing::debug;

use crate::{
    detections::DetectionRecord,
    error::{RedactionError, Result},
    redaction::geometry::{PixelRect, Region},
    redaction::traits::{ApplyStats, Redact},
    video::types::Frame,
};

/// Gaussian blur restricted to each detection's centered region
///
/// The region is `[cy - hh : cy + hh, cx - hw : cx + hw]` around the rounded
/// box center and is blurred in isolation: samples past its edges are
/// reflected back inside it (`dcb|abcdefgh|gfe`), never read from the
/// surrounding frame.
#[derive(Debug, Clone)]
pub struct GaussianBlur {
    kernel_size: u32,
    kernel: Vec<f32>,
}

impl GaussianBlur {
    /// `kernel_size` must be odd and positive
    pub fn new(kernel_size: u32) -> Result<Self> {
        if kernel_size == 0 || kernel_size % 2 == 0 {
            return Err(RedactionError::InvalidParameters {
                details: format!("blur kernel size must be odd and positive, got {}", kernel_size),
            }
            .into());
        }

        Ok(Self {
            kernel_size,
            kernel: gaussian_kernel(kernel_size),
        })
    }

    pub fn kernel_size(&self) -> u32 {
        self.kernel_size
    }

    /// Separable convolution of one region, horizontal pass then vertical
    fn blur_region(&self, frame: &mut Frame, region: Region) {
        let width = region.width as usize;
        let height = region.height as usize;
        let stride = width * 3;
        let radius = (self.kernel.len() / 2) as i64;

        let mut source = vec![0f32; stride * height];
        for (row, chunk) in source.chunks_mut(stride).enumerate() {
            for col in 0..width {
                let pixel = frame.get_pixel(region.x + col as u32, region.y + row as u32);
                for c in 0..3 {
                    chunk[col * 3 + c] = pixel[c] as f32;
                }
            }
        }

        let mut horizontal = vec![0f32; stride * height];
        horizontal
            .par_chunks_mut(stride)
            .zip(source.par_chunks(stride))
            .for_each(|(out, row)| {
                for col in 0..width {
                    let mut acc = [0f32; 3];
                    for (k, weight) in self.kernel.iter().enumerate() {
                        let src = reflect_101(col as i64 + k as i64 - radius, width);
                        for c in 0..3 {
                            acc[c] += weight * row[src * 3 + c];
                        }
                    }
                    out[col * 3..col * 3 + 3].copy_from_slice(&acc);
                }
            });

        let mut vertical = source;
        vertical
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(row, out)| {
                for value in out.iter_mut() {
                    *value = 0.0;
                }
                for (k, weight) in self.kernel.iter().enumerate() {
                    let src = reflect_101(row as i64 + k as i64 - radius, height);
                    let src_row = &horizontal[src * stride..(src + 1) * stride];
                    for (value, sample) in out.iter_mut().zip(src_row) {
                        *value += weight * sample;
                    }
                }
            });

        for (row, chunk) in vertical.chunks(stride).enumerate() {
            for col in 0..width {
                let pixel = frame.get_pixel_mut(region.x + col as u32, region.y + row as u32);
                for c in 0..3 {
                    pixel[c] = chunk[col * 3 + c].round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

/// Normalized 1-D Gaussian weights; sigma derived from the kernel size as
/// `0.3 * ((k - 1) * 0.5 - 1) + 0.8`
pub fn gaussian_kernel(kernel_size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((kernel_size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (kernel_size / 2) as f64;
    let weights: Vec<f64> = (0..kernel_size)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / sum) as f32).collect()
}

/// Mirror an out-of-range index back into `0..len` without repeating the edge sample
pub fn reflect_101(index: i64, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len as i64 - 1);
    let m = index.rem_euclid(period);
    if m >= len as i64 {
        (period - m) as usize
    } else {
        m as usize
    }
}

impl Redact for GaussianBlur {
    fn name(&self) -> &str {
        "blur"
    }

    fn description(&self) -> &str {
        "Gaussian blur over the centered detection region"
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
                    self.blur_region(frame, region);
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
