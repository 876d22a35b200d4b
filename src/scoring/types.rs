//! Data types shared by the grid parser, the session and the score file

use std::fmt;
use std::path::PathBuf;

use super::error::{Result, ScoringError};

/// Geometry of one parsed grid file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateGrid {
    /// `<imageId>_<gridId>`, the grid file name without extension
    pub plate_id: String,
    pub image_id: String,
    pub rows: u32,
    pub columns: u32,
    /// Side length in source pixels of every square region
    pub region_size: u32,
    pub path: PathBuf,
}

impl PlateGrid {
    pub fn declared_regions(&self) -> usize {
        self.rows as usize * self.columns as usize
    }
}

/// One addressable cell of a plate.
///
/// The whole tuple is the identity used to key scores, so regions parsed from
/// an edited grid file no longer match scores recorded against the old one.
/// Offsets keep the text found in the grid file and are only parsed when the
/// region is opened.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GridRegion {
    pub plate_id: String,
    pub row: u32,
    pub col: u32,
    pub x: String,
    pub y: String,
}

impl GridRegion {
    /// Crop window `(x, y, width, height)` of a `size` x `size` region.
    /// Blocks starting left of or above the image are clipped to its edge.
    pub fn crop_window(&self, size: u32) -> Result<(u32, u32, u32, u32)> {
        let (x, width) = self.clip_axis(&self.x, size)?;
        let (y, height) = self.clip_axis(&self.y, size)?;
        Ok((x, y, width, height))
    }

    fn clip_axis(&self, value: &str, size: u32) -> Result<(u32, u32)> {
        let invalid = || ScoringError::InvalidOffset {
            plate_id: self.plate_id.clone(),
            row: self.row,
            col: self.col,
            value: value.to_string(),
        };
        let start = value.trim().parse::<i64>().map_err(|_| invalid())?;
        let end = start + i64::from(size);
        // Nothing of the block is left once it ends at or before the edge
        if end <= 0 || start > i64::from(u32::MAX) {
            return Err(invalid());
        }
        let start = start.max(0);
        Ok((start as u32, (end - start) as u32))
    }

    pub fn thumbnail_name(&self) -> String {
        format!("{}_{}_{}.jpg", self.plate_id, self.row, self.col)
    }
}

impl fmt::Display for GridRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: row {}, col {}", self.plate_id, self.row, self.col)
    }
}

/// Display bounds used to stretch raw pixel values onto 0..=255.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contrast {
    pub min: f64,
    pub max: f64,
}

impl Contrast {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !(min < max) {
            return Err(ScoringError::InvalidContrast { min, max });
        }
        Ok(Self { min, max })
    }

    /// Replace either bound, keeping the other.
    pub fn with(self, min: Option<f64>, max: Option<f64>) -> Result<Self> {
        Self::new(min.unwrap_or(self.min), max.unwrap_or(self.max))
    }
}

impl Default for Contrast {
    fn default() -> Self {
        Self { min: 0.0, max: 255.0 }
    }
}

/// The operator's judgement of one region.
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub region: GridRegion,
    /// Bounds in effect when the score was written
    pub contrast: Contrast,
    pub text: String,
}

/// Result of forward navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A region was opened; carries its previously recorded score or "".
    Opened { score: String },
    /// The traversal is exhausted; nothing changed.
    NoMoreRegions,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: &str, y: &str) -> GridRegion {
        GridRegion {
            plate_id: "img_a".to_string(),
            row: 2,
            col: 3,
            x: x.to_string(),
            y: y.to_string(),
        }
    }

    #[test]
    fn test_crop_window_parsed_on_demand() {
        assert_eq!(region("10", "20").crop_window(50).unwrap(), (10, 20, 50, 50));
        match region("10", "2.5").crop_window(50) {
            Err(ScoringError::InvalidOffset { value, row, col, .. }) => {
                assert_eq!(value, "2.5");
                assert_eq!((row, col), (2, 3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_negative_offsets_clip_at_edge() {
        assert_eq!(region("-3", "0").crop_window(10).unwrap(), (0, 0, 7, 10));
        assert_eq!(region("4", "-9").crop_window(10).unwrap(), (4, 0, 10, 1));
        assert!(matches!(
            region("-10", "0").crop_window(10),
            Err(ScoringError::InvalidOffset { .. })
        ));
    }

    #[test]
    fn test_thumbnail_name_and_label() {
        let r = region("1", "1");
        assert_eq!(r.thumbnail_name(), "img_a_2_3.jpg");
        assert_eq!(r.to_string(), "img_a: row 2, col 3");
    }

    #[test]
    fn test_contrast_asymmetric_update() {
        let c = Contrast::default();
        let c = c.with(Some(10.0), None).unwrap();
        assert_eq!(c, Contrast { min: 10.0, max: 255.0 });
        let c = c.with(None, Some(100.0)).unwrap();
        assert_eq!(c, Contrast { min: 10.0, max: 100.0 });
        assert!(c.with(Some(100.0), None).is_err());
        assert!(Contrast::new(f64::NAN, 1.0).is_err());
    }
}
