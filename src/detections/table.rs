use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::ops::Range;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, info, warn};

use crate::detections::record::{BBox, ClassId, DetectionRecord, TargetClasses, COORDINATE_LIMIT};
use crate::error::{Result, TableError};

const FRAME_ID: &str = "frame_id";
const TRACKING_ID: &str = "tracking_id";
const CLS: &str = "cls";
const CONF: &str = "conf";
const X1: &str = "x1";
const Y1: &str = "y1";
const X2: &str = "x2";
const Y2: &str = "y2";

/// Canonical column order used when writing tables
pub const COLUMNS: [&str; 8] = [FRAME_ID, TRACKING_ID, CLS, CONF, X1, Y1, X2, Y2];

/// Outcome of a table load: malformed rows are skipped, not fatal
#[derive(Debug, Default)]
pub struct LoadReport {
    pub rows_read: usize,
    pub rows_loaded: usize,
    pub skipped: Vec<TableError>,
}

impl LoadReport {
    pub fn rows_skipped(&self) -> usize {
        self.skipped.len()
    }
}

/// Per-class statistics reported by [`DetectionTable::summary`]
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSummary {
    pub count: usize,
    pub mean_confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSummary {
    pub records: usize,
    pub frames: usize,
    pub first_frame: Option<u64>,
    pub last_frame: Option<u64>,
    pub classes: BTreeMap<ClassId, ClassSummary>,
}

/// Detection records grouped by frame index
///
/// Records live in one arena ordered by `frame_id`; within a frame they keep
/// the order they were read in. Lookups go through a per-frame index range,
/// so a query never rescans the table.
#[derive(Debug, Default)]
pub struct DetectionTable {
    records: Vec<DetectionRecord>,
    index: HashMap<u64, Range<usize>>,
    report: LoadReport,
}

/// Column positions resolved from the header row
struct Columns {
    frame_id: usize,
    tracking_id: Option<usize>,
    cls: usize,
    conf: usize,
    x1: usize,
    y1: usize,
    x2: usize,
    y2: usize,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| TableError::MissingColumn {
                column: name.to_string(),
            })
        };

        Ok(Self {
            frame_id: require(FRAME_ID)?,
            tracking_id: find(TRACKING_ID),
            cls: require(CLS)?,
            conf: require(CONF)?,
            x1: require(X1)?,
            y1: require(Y1)?,
            x2: require(X2)?,
            y2: require(Y2)?,
        })
    }

    fn parse(&self, row: &StringRecord) -> std::result::Result<DetectionRecord, String> {
        let field = |idx: usize, name: &str| {
            row.get(idx)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| format!("missing value for '{}'", name))
        };

        let frame_id = parse_index(field(self.frame_id, FRAME_ID)?)
            .ok_or_else(|| format!("invalid {}", FRAME_ID))?;
        let tracking_id = match self.tracking_id.and_then(|idx| row.get(idx)) {
            Some(value) => parse_optional_id(value).map_err(|_| format!("invalid {}", TRACKING_ID))?,
            None => None,
        };
        let cls = parse_index(field(self.cls, CLS)?)
            .and_then(|v| ClassId::try_from(v).ok())
            .ok_or_else(|| format!("invalid {}", CLS))?;
        let confidence = parse_float(field(self.conf, CONF)?, CONF)?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!("confidence {} outside [0, 1]", confidence));
        }

        let bbox = BBox::new(
            parse_float(field(self.x1, X1)?, X1)?,
            parse_float(field(self.y1, Y1)?, Y1)?,
            parse_float(field(self.x2, X2)?, X2)?,
            parse_float(field(self.y2, Y2)?, Y2)?,
        );
        if !bbox.is_well_formed() {
            return Err(format!(
                "bbox ({}, {}, {}, {}) is not ordered",
                bbox.x1, bbox.y1, bbox.x2, bbox.y2
            ));
        }
        if !bbox.is_in_pixel_range() {
            return Err(format!(
                "bbox ({}, {}, {}, {}) exceeds the pixel range +/-{}",
                bbox.x1, bbox.y1, bbox.x2, bbox.y2, COORDINATE_LIMIT
            ));
        }

        Ok(DetectionRecord {
            frame_id,
            tracking_id,
            cls,
            confidence,
            bbox,
        })
    }
}

/// Non-negative integer, tolerating integral floats such as `5.0`
fn parse_index(value: &str) -> Option<u64> {
    if let Ok(v) = value.parse::<u64>() {
        return Some(v);
    }
    let v = value.parse::<f64>().ok()?;
    (v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64).then_some(v as u64)
}

fn parse_optional_id(value: &str) -> std::result::Result<Option<i64>, ()> {
    if value.is_empty() || ["none", "nan", "null"].contains(&value.to_ascii_lowercase().as_str()) {
        return Ok(None);
    }
    if let Ok(v) = value.parse::<i64>() {
        return Ok(Some(v));
    }
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => Ok(Some(v as i64)),
        _ => Err(()),
    }
}

fn parse_float(value: &str, name: &str) -> std::result::Result<f64, String> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("invalid {} '{}'", name, value))
}

/// Guess the field delimiter from the header line
pub fn sniff_delimiter(header_line: &str) -> u8 {
    if header_line.contains('\t') {
        b'\t'
    } else if header_line.contains(';') {
        b';'
    } else {
        b','
    }
}

impl DetectionTable {
    /// Load a table from a delimited text file
    ///
    /// The delimiter is sniffed from the header line unless given. Rows that
    /// fail to parse are logged and skipped; see [`LoadReport`].
    pub fn load<P: AsRef<Path>>(path: P, delimiter: Option<u8>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| TableError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let delimiter = delimiter
            .unwrap_or_else(|| sniff_delimiter(content.lines().next().unwrap_or_default()));
        debug!("Reading {:?} with delimiter {:?}", path, delimiter as char);

        let table = Self::from_reader(content.as_bytes(), delimiter)?;
        info!(
            "Loaded {} detections over {} frames from {:?} ({} rows skipped)",
            table.len(),
            table.frame_count(),
            path,
            table.report.rows_skipped()
        );
        Ok(table)
    }

    /// Parse a table from any reader with a header row
    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| TableError::Open {
                path: "<reader>".to_string(),
                reason: e.to_string(),
            })?
            .clone();
        let columns = Columns::resolve(&headers)?;

        let mut report = LoadReport::default();
        let mut records = Vec::new();

        for (row_idx, row) in reader.records().enumerate() {
            report.rows_read += 1;
            // Header is line 1
            let fallback_line = row_idx as u64 + 2;

            let parsed = row
                .map_err(|e| {
                    let line = e.position().map(|p| p.line()).unwrap_or(fallback_line);
                    (line, e.to_string())
                })
                .and_then(|row| {
                    let line = row.position().map(|p| p.line()).unwrap_or(fallback_line);
                    columns.parse(&row).map_err(|reason| (line, reason))
                });

            match parsed {
                Ok(record) => records.push(record),
                Err((line, reason)) => {
                    let err = TableError::MalformedRecord { line, reason };
                    warn!("Skipping row: {}", err);
                    report.skipped.push(err);
                }
            }
        }

        report.rows_loaded = records.len();
        let mut table = Self::from_records(records);
        table.report = report;
        Ok(table)
    }

    /// Build a table from records already in memory
    pub fn from_records(mut records: Vec<DetectionRecord>) -> Self {
        // Stable: preserves read order inside each frame
        records.sort_by_key(|r| r.frame_id);

        let mut index: HashMap<u64, Range<usize>> = HashMap::new();
        let mut start = 0;
        while start < records.len() {
            let frame_id = records[start].frame_id;
            let end = start
                + records[start..]
                    .iter()
                    .take_while(|r| r.frame_id == frame_id)
                    .count();
            index.insert(frame_id, start..end);
            start = end;
        }

        let rows = records.len();
        Self {
            records,
            index,
            report: LoadReport {
                rows_read: rows,
                rows_loaded: rows,
                skipped: Vec::new(),
            },
        }
    }

    /// All detections for `frame_id`, empty when the frame has none
    pub fn lookup(&self, frame_id: u64) -> &[DetectionRecord] {
        self.index
            .get(&frame_id)
            .map(|range| &self.records[range.clone()])
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of distinct frames with at least one detection
    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    pub fn records(&self) -> &[DetectionRecord] {
        &self.records
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn summary(&self) -> TableSummary {
        let mut sums: BTreeMap<ClassId, (usize, f64)> = BTreeMap::new();
        for record in &self.records {
            let entry = sums.entry(record.cls).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += record.confidence;
        }

        TableSummary {
            records: self.records.len(),
            frames: self.index.len(),
            first_frame: self.records.first().map(|r| r.frame_id),
            last_frame: self.records.last().map(|r| r.frame_id),
            classes: sums
                .into_iter()
                .map(|(cls, (count, total))| {
                    (
                        cls,
                        ClassSummary {
                            count,
                            mean_confidence: total / count as f64,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Keep only records of target classes at or above `min_confidence`
    pub fn filtered(&self, targets: &TargetClasses, min_confidence: f64) -> Self {
        Self::from_records(
            self.records
                .iter()
                .filter(|r| targets.contains(r.cls) && r.confidence >= min_confidence)
                .cloned()
                .collect(),
        )
    }

    /// Write the table as comma separated values in canonical column order
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let write_err = |reason: String| TableError::Write {
            path: path.display().to_string(),
            reason,
        };

        let mut writer = csv::Writer::from_path(path).map_err(|e| write_err(e.to_string()))?;
        writer.write_record(COLUMNS).map_err(|e| write_err(e.to_string()))?;

        for r in &self.records {
            let tracking_id = r.tracking_id.map(|t| t.to_string()).unwrap_or_default();
            writer
                .write_record([
                    r.frame_id.to_string(),
                    tracking_id,
                    r.cls.to_string(),
                    r.confidence.to_string(),
                    r.bbox.x1.to_string(),
                    r.bbox.y1.to_string(),
                    r.bbox.x2.to_string(),
                    r.bbox.y2.to_string(),
                ])
                .map_err(|e| write_err(e.to_string()))?;
        }

        writer.flush()?;
        Ok(())
    }
}
