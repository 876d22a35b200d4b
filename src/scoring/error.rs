//! Error types for grid parsing, score persistence and session control

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Grid file name {path:?} must be <imageId>_<gridId> with exactly one '_'")]
    Naming { path: PathBuf },

    #[error("Bad grid header in {path:?}: {reason}")]
    Header { path: PathBuf, reason: String },

    #[error("Parse error in {path:?} line {line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Grid {path:?} declares {declared} regions but lists {found}")]
    GridOverflow {
        path: PathBuf,
        declared: usize,
        found: usize,
    },

    #[error("Couldn't find the image '{image_id}' next to {grid:?}: {reason}")]
    ImageNotFound {
        image_id: String,
        grid: PathBuf,
        reason: String,
    },

    #[error("Plate '{0}' was loaded twice")]
    DuplicatePlate(String),

    #[error("The grid files contain no regions")]
    EmptySession,

    #[error("Corrupt score file {path:?} line {line}: {reason}")]
    CorruptScoreFile {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Region {plate_id} row {row}, col {col} has a bad offset '{value}'")]
    InvalidOffset {
        plate_id: String,
        row: u32,
        col: u32,
        value: String,
    },

    #[error("Offset ({x}, {y}) lies outside the {width}x{height} source image")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    #[error("Display minimum {min} must be below maximum {max}")]
    InvalidContrast { min: f64, max: f64 },

    #[error("No region is open")]
    NothingOpen,

    #[error("Unknown plate '{0}'")]
    UnknownPlate(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScoringError>;
