//! # Detection Tables
//!
//! Per-frame object detections produced by an external detector/tracker,
//! loaded once and queried by frame index while rendering.
//!
//! ## Format
//!
//! One row per detected object with a header row. Columns are located by
//! name, so extra columns (such as a leading index column) are ignored:
//!
//! ```text
//! frame_id,tracking_id,cls,conf,x1,y1,x2,y2
//! 0,,0,0.91,10.0,10.0,30.0,30.0
//! ```

pub mod record;
pub mod table;

pub use record::{BBox, ClassId, DetectionRecord, TargetClasses, COORDINATE_LIMIT};
pub use table::{ClassSummary, DetectionTable, LoadReport, TableSummary};
