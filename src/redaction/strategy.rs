use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    detections::{DetectionRecord, TargetClasses},
    error::Result,
    redaction::{
        blur::GaussianBlur,
        mosaic::Mosaic,
        overlay::ImageOverlay,
        rect::RectOutline,
        traits::{ApplyStats, Redact},
    },
    video::types::Frame,
};

/// Default Gaussian kernel size
pub const DEFAULT_KERNEL_SIZE: u32 = 51;

/// Default mosaic down-scale factor
pub const DEFAULT_SCALE: u32 = 50;

/// User-facing choice of redaction style and its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "lowercase")]
pub enum StyleSpec {
    Rect,
    Image { overlay_path: PathBuf },
    Blur { kernel_size: u32 },
    Mosaic { scale: u32 },
}

impl StyleSpec {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rect => "rect",
            Self::Image { .. } => "image",
            Self::Blur { .. } => "blur",
            Self::Mosaic { .. } => "mosaic",
        }
    }
}

impl fmt::Display for StyleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rect => write!(f, "rect"),
            Self::Image { overlay_path } => write!(f, "image ({})", overlay_path.display()),
            Self::Blur { kernel_size } => write!(f, "blur (kernel {})", kernel_size),
            Self::Mosaic { scale } => write!(f, "mosaic (scale {})", scale),
        }
    }
}

/// The closed set of redaction variants
#[derive(Debug, Clone)]
pub enum RedactionStrategy {
    Rect(RectOutline),
    ImageOverlay(ImageOverlay),
    GaussianBlur(GaussianBlur),
    Mosaic(Mosaic),
}

impl RedactionStrategy {
    /// Build a strategy, loading any assets it needs up front
    pub fn from_spec(spec: &StyleSpec) -> Result<Self> {
        let strategy = match spec {
            StyleSpec::Rect => Self::Rect(RectOutline::new()),
            StyleSpec::Image { overlay_path } => Self::ImageOverlay(ImageOverlay::load(overlay_path)?),
            StyleSpec::Blur { kernel_size } => Self::GaussianBlur(GaussianBlur::new(*kernel_size)?),
            StyleSpec::Mosaic { scale } => Self::Mosaic(Mosaic::new(*scale)?),
        };
        Ok(strategy)
    }

    fn inner(&self) -> &dyn Redact {
        match self {
            Self::Rect(s) => s,
            Self::ImageOverlay(s) => s,
            Self::GaussianBlur(s) => s,
            Self::Mosaic(s) => s,
        }
    }
}

impl Redact for RedactionStrategy {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn description(&self) -> &str {
        self.inner().description()
    }

    fn redact(&self, frame: &mut Frame, detections: &[&DetectionRecord]) -> ApplyStats {
        self.inner().redact(frame, detections)
    }
}

/// A strategy bound to the classes it acts on
#[derive(Debug, Clone)]
pub struct Redactor {
    strategy: RedactionStrategy,
    targets: TargetClasses,
}

impl Redactor {
    pub fn new(strategy: RedactionStrategy, targets: TargetClasses) -> Self {
        Self { strategy, targets }
    }

    pub fn from_spec(spec: &StyleSpec, targets: TargetClasses) -> Result<Self> {
        let strategy = RedactionStrategy::from_spec(spec)?;
        info!("Redaction style: {} ({}), targets {}", spec, strategy.description(), targets);
        Ok(Self::new(strategy, targets))
    }

    pub fn name(&self) -> &str {
        self.strategy.name()
    }

    pub fn targets(&self) -> &TargetClasses {
        &self.targets
    }

    /// Redact one frame with this frame's detections, in table order
    ///
    /// Detections of classes outside the target set are counted but never
    /// touch the frame.
    pub fn apply(&self, frame: &mut Frame, detections: &[DetectionRecord]) -> ApplyStats {
        let targeted: Vec<&DetectionRecord> = detections
            .iter()
            .filter(|d| self.targets.contains(d.cls))
            .collect();
        let filtered_out = detections.len() - targeted.len();

        let mut stats = if targeted.is_empty() {
            ApplyStats::default()
        } else {
            self.strategy.redact(frame, &targeted)
        };
        stats.filtered_out += filtered_out;
        stats
    }
}
