//! Pixel-space rectangles derived from detection boxes.

use crate::detections::BBox;

/// Round half to even, the convention used for every box-to-pixel conversion
pub fn round_half_even(value: f64) -> i64 {
    value.round_ties_even() as i64
}

/// Half-open pixel rectangle `[left, right) x [top, bottom)`, possibly off-frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

/// Non-empty rectangle fully inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        Self { left, top, right, bottom }
    }

    /// `[round(y1):round(y2), round(x1):round(x2)]`
    pub fn from_corners(bbox: &BBox) -> Self {
        Self::new(
            round_half_even(bbox.x1),
            round_half_even(bbox.y1),
            round_half_even(bbox.x2),
            round_half_even(bbox.y2),
        )
    }

    /// Square-symmetric rectangle around the rounded box center
    ///
    /// `cx = round((x1 + x2) / 2)`, `hw = round((x2 - x1) / 2)`, giving
    /// `[cy - hh : cy + hh, cx - hw : cx + hw]`. This differs from
    /// [`PixelRect::from_corners`] when the rounded extents are odd.
    pub fn centered(bbox: &BBox) -> Self {
        let cx = round_half_even((bbox.x1 + bbox.x2) / 2.0);
        let cy = round_half_even((bbox.y1 + bbox.y2) / 2.0);
        let hw = round_half_even((bbox.x2 - bbox.x1) / 2.0);
        let hh = round_half_even((bbox.y2 - bbox.y1) / 2.0);
        Self::new(
            cx.saturating_sub(hw),
            cy.saturating_sub(hh),
            cx.saturating_add(hw),
            cy.saturating_add(hh),
        )
    }

    pub fn width(&self) -> i64 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i64 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Intersection with a `width x height` frame, `None` when nothing is left
    pub fn clip(&self, width: u32, height: u32) -> Option<Region> {
        let left = self.left.clamp(0, width as i64);
        let right = self.right.clamp(0, width as i64);
        let top = self.top.clamp(0, height as i64);
        let bottom = self.bottom.clamp(0, height as i64);

        if right <= left || bottom <= top {
            return None;
        }

        Some(Region {
            x: left as u32,
            y: top as u32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }
}

impl Region {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}
