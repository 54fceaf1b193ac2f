//! Redaction strategies
//!
//! Each strategy takes one decoded frame plus that frame's detections and
//! modifies the pixels inside the detection boxes:
//!
//! - **rect**: blue outline around each box
//! - **image**: overlay image alpha-composited into each box
//! - **blur**: Gaussian blur over the centered box region
//! - **mosaic**: pixelated blocks over each box
//!
//! Boxes are converted to pixels with round-half-to-even and clipped to the
//! frame; boxes that end up empty are skipped.

pub mod blur;
pub mod geometry;
pub mod mosaic;
pub mod overlay;
pub mod rect;
pub mod strategy;
pub mod traits;

pub use blur::GaussianBlur;
pub use geometry::{PixelRect, Region};
pub use mosaic::Mosaic;
pub use overlay::ImageOverlay;
pub use rect::RectOutline;
pub use strategy::{RedactionStrategy, Redactor, StyleSpec, DEFAULT_KERNEL_SIZE, DEFAULT_SCALE};
pub use traits::{ApplyStats, Redact};
