//! Grid file parsing
//!
//! A grid file is tab separated. The first line holds `rows`, `columns` and
//! the region side length; every following line holds the `x` and `y` offset
//! of one region in row-major order. The file must be named
//! `<imageId>_<gridId>.<ext>` and sit next to `<imageId>.<imageExt>`.

use log::{debug, warn};
use std::path::{Path, PathBuf};

use super::error::{Result, ScoringError};
use super::host::ImageHost;
use super::types::{GridRegion, PlateGrid};

/// A parsed grid together with the open source image it addresses.
pub struct GridCatalog<I> {
    pub grid: PlateGrid,
    pub regions: Vec<GridRegion>,
    pub source: I,
}

impl<I> GridCatalog<I> {
    /// Parse `path` and open its companion image through `host`.
    ///
    /// The grid body is parsed before the image is opened so that a bad grid
    /// never leaves an image handle behind.
    pub fn load<H>(host: &mut H, path: &Path, image_extensions: &[String]) -> Result<Self>
    where
        H: ImageHost<Image = I>,
    {
        let (grid, regions) = parse_grid(path)?;
        let image_path = locate_image(&grid, image_extensions)?;
        let source = host
            .open(&image_path)
            .map_err(|e| ScoringError::ImageNotFound {
                image_id: grid.image_id.clone(),
                grid: grid.path.clone(),
                reason: e.to_string(),
            })?;
        debug!(
            "Loaded plate {} ({} regions) from {}",
            grid.plate_id,
            regions.len(),
            image_path.display()
        );
        Ok(Self {
            grid,
            regions,
            source,
        })
    }
}

/// Split a grid file stem into `(plate_id, image_id)`.
pub fn plate_names(path: &Path) -> Result<(String, String)> {
    let naming = || ScoringError::Naming {
        path: path.to_path_buf(),
    };
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(naming)?;
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(naming());
    }
    Ok((stem.to_string(), parts[0].to_string()))
}

/// Parse a grid file without touching its image.
pub fn parse_grid(path: &Path) -> Result<(PlateGrid, Vec<GridRegion>)> {
    let (plate_id, image_id) = plate_names(path)?;
    let content = std::fs::read_to_string(path)?;
    parse_grid_text(path, plate_id, image_id, &content)
}

fn parse_grid_text(
    path: &Path,
    plate_id: String,
    image_id: String,
    content: &str,
) -> Result<(PlateGrid, Vec<GridRegion>)> {
    let mut lines = content.lines().enumerate();

    let header_error = |reason: String| ScoringError::Header {
        path: path.to_path_buf(),
        reason,
    };
    let (_, first) = lines
        .next()
        .ok_or_else(|| header_error("file is empty".to_string()))?;
    let fields: Vec<&str> = first.split('\t').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(header_error(format!(
            "expected 3 fields on the first line, found {}",
            fields.len()
        )));
    }
    let mut dims = [0u32; 3];
    for (slot, field) in dims.iter_mut().zip(&fields) {
        *slot = match field.parse::<u32>() {
            Ok(v) if v > 0 => v,
            _ => return Err(header_error(format!("'{}' is not a positive integer", field))),
        };
    }
    let [rows, columns, region_size] = dims;

    let grid = PlateGrid {
        plate_id,
        image_id,
        rows,
        columns,
        region_size,
        path: path.to_path_buf(),
    };

    let mut regions = Vec::with_capacity(grid.declared_regions());
    let mut row = 1;
    let mut col = 1;
    for (idx, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        if fields.len() != 2 {
            return Err(ScoringError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: format!("expected x and y, found {} fields", fields.len()),
            });
        }
        if col > columns {
            col = 1;
            row += 1;
        }
        regions.push(GridRegion {
            plate_id: grid.plate_id.clone(),
            row,
            col,
            x: fields[0].to_string(),
            y: fields[1].to_string(),
        });
        col += 1;
    }

    let declared = grid.declared_regions();
    if regions.len() > declared {
        return Err(ScoringError::GridOverflow {
            path: path.to_path_buf(),
            declared,
            found: regions.len(),
        });
    }
    if regions.len() < declared {
        warn!(
            "Grid {} declares {}x{} = {} regions but lists only {}",
            path.display(),
            rows,
            columns,
            declared,
            regions.len()
        );
    }

    Ok((grid, regions))
}

/// Find `<imageId>.<ext>` next to the grid file, trying each extension.
fn locate_image(grid: &PlateGrid, image_extensions: &[String]) -> Result<PathBuf> {
    let directory = grid.path.parent().unwrap_or_else(|| Path::new(""));
    image_extensions
        .iter()
        .map(|ext| directory.join(format!("{}.{}", grid.image_id, ext)))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ScoringError::ImageNotFound {
            image_id: grid.image_id.clone(),
            grid: grid.path.clone(),
            reason: format!("no file with extension {}", image_extensions.join(", ")),
        })
}
