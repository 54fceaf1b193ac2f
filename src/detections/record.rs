use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Class label id assigned by the detector
pub type ClassId = u32;

/// Largest accepted absolute box coordinate, the `i32` pixel range
pub const COORDINATE_LIMIT: f64 = i32::MAX as f64;

/// Axis-aligned bounding box in image pixel coordinates, `x1 < x2`, `y1 < y2`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Unrounded area, used to order overlay stacking
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// All coordinates finite and corners correctly ordered
    pub fn is_well_formed(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2].iter().all(|v| v.is_finite())
            && self.x1 < self.x2
            && self.y1 < self.y2
    }

    /// Every corner lies within `[-COORDINATE_LIMIT, COORDINATE_LIMIT]`
    pub fn is_in_pixel_range(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.abs() <= COORDINATE_LIMIT)
    }
}

/// One observed object instance in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub frame_id: u64,
    pub tracking_id: Option<i64>,
    pub cls: ClassId,
    pub confidence: f64,
    pub bbox: BBox,
}

impl DetectionRecord {
    pub fn new(frame_id: u64, cls: ClassId, bbox: BBox) -> Self {
        Self {
            frame_id,
            tracking_id: None,
            cls,
            confidence: 1.0,
            bbox,
        }
    }

    pub fn with_tracking_id(mut self, tracking_id: i64) -> Self {
        self.tracking_id = Some(tracking_id);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Set of class ids a strategy acts on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetClasses(BTreeSet<ClassId>);

impl TargetClasses {
    pub fn new<I: IntoIterator<Item = ClassId>>(classes: I) -> Self {
        Self(classes.into_iter().collect())
    }

    pub fn contains(&self, cls: ClassId) -> bool {
        self.0.contains(&cls)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.0.iter().copied()
    }
}

impl Default for TargetClasses {
    fn default() -> Self {
        Self::new([0, 1, 2, 3])
    }
}

impl FromIterator<ClassId> for TargetClasses {
    fn from_iter<I: IntoIterator<Item = ClassId>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl FromStr for TargetClasses {
    type Err = String;

    /// Parses `0,1,2`, `[0, 1, 2]` or whitespace separated ids
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('[').trim_end_matches(']');
        trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<ClassId>()
                    .map_err(|_| format!("invalid class id '{}'", part))
            })
            .collect()
    }
}

impl fmt::Display for TargetClasses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", ids.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_geometry() {
        let bbox = BBox::new(10.0, 20.0, 30.0, 60.0);
        assert_eq!(bbox.width(), 20.0);
        assert_eq!(bbox.height(), 40.0);
        assert_eq!(bbox.area(), 800.0);
        assert!(bbox.is_well_formed());

        assert!(!BBox::new(30.0, 20.0, 10.0, 60.0).is_well_formed());
        assert!(!BBox::new(0.0, f64::NAN, 10.0, 60.0).is_well_formed());
    }

    #[test]
    fn test_pixel_range() {
        assert!(BBox::new(-50.0, -50.0, 4000.0, 3000.0).is_in_pixel_range());
        assert!(BBox::new(0.0, 0.0, COORDINATE_LIMIT, 1.0).is_in_pixel_range());
        assert!(!BBox::new(0.0, 0.0, 1e300, 1e300).is_in_pixel_range());
        assert!(!BBox::new(-1e10, 0.0, 10.0, 10.0).is_in_pixel_range());
    }

    #[test]
    fn test_target_parsing() {
        let targets: TargetClasses = "0,2, 5".parse().unwrap();
        assert!(targets.contains(0));
        assert!(targets.contains(5));
        assert!(!targets.contains(1));

        let bracketed: TargetClasses = "[1, 3]".parse().unwrap();
        assert_eq!(bracketed.to_string(), "[1, 3]");

        assert!("1,x".parse::<TargetClasses>().is_err());
        assert!("".parse::<TargetClasses>().unwrap().is_empty());
    }

    #[test]
    fn test_default_targets() {
        let targets = TargetClasses::default();
        assert_eq!(targets.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }
}
