//! Scoring session: traversal, scores and reports
//!
//! A session merges the regions of every grid, shuffles them once and walks
//! the result with a cursor. Exactly one cropped region image is open at a
//! time. Scores are keyed by region identity and the whole score file is
//! rewritten after every score, so an interrupted session can be resumed
//! from it.

use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::error::{Result, ScoringError};
use super::grid::GridCatalog;
use super::host::ImageHost;
use super::report::{write_report, ReportOptions};
use super::scores::{read_scores, write_scores};
use super::types::{Contrast, GridRegion, PlateGrid, Score, Step};

/// Where a session writes and how it renders.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub score_file: PathBuf,
    pub thumb_dir: PathBuf,
    /// Extensions tried, in order, for a grid's companion image
    pub image_extensions: Vec<String>,
    /// Bounds used until the operator or a restored score changes them
    pub default_contrast: Contrast,
    pub report: ReportOptions,
    /// Fixed shuffle seed; `None` draws one from the OS
    pub seed: Option<u64>,
}

impl SessionOptions {
    /// Options with the thumbnail directory `<score stem>_cropped` placed
    /// next to the score file.
    pub fn for_score_file(score_file: PathBuf) -> Self {
        let thumb_dir = sibling(&score_file, "_cropped");
        Self {
            score_file,
            thumb_dir,
            image_extensions: vec!["tif".to_string(), "tiff".to_string()],
            default_contrast: Contrast::default(),
            report: ReportOptions::default(),
            seed: None,
        }
    }

    pub fn report_paths(&self) -> ReportPaths {
        ReportPaths {
            by_score: sibling(&self.score_file, ".html"),
            with_positions: sibling(&self.score_file, "-with-plate-positions.html"),
        }
    }
}

/// `<dir>/<stem><suffix>` for a path `<dir>/<stem>.<ext>`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}", stem, suffix))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub by_score: PathBuf,
    pub with_positions: PathBuf,
}

/// A plate's geometry and the source image it owns.
struct Plate<I> {
    grid: PlateGrid,
    source: I,
}

pub struct ScoringSession<H: ImageHost> {
    host: H,
    plates: HashMap<String, Plate<H::Image>>,
    traversal: Vec<GridRegion>,
    /// `None` until the first region is opened
    cursor: Option<usize>,
    scores: HashMap<GridRegion, Score>,
    /// Keys of `scores` in the order they were first recorded
    score_order: Vec<GridRegion>,
    contrast: Contrast,
    open_image: Option<H::Image>,
    options: SessionOptions,
}

impl<H: ImageHost> ScoringSession<H> {
    /// Load every grid, shuffle the merged regions and resume from an
    /// existing score file.
    ///
    /// On failure every image opened so far has been released.
    pub fn new(mut host: H, grid_paths: &[PathBuf], options: SessionOptions) -> Result<Self> {
        let mut plates: HashMap<String, Plate<H::Image>> = HashMap::new();
        let mut traversal = Vec::new();

        for path in grid_paths {
            let loaded = GridCatalog::load(&mut host, path, &options.image_extensions)
                .and_then(|catalog| {
                    if plates.contains_key(&catalog.grid.plate_id) {
                        let plate_id = catalog.grid.plate_id.clone();
                        host.release(catalog.source);
                        return Err(ScoringError::DuplicatePlate(plate_id));
                    }
                    Ok(catalog)
                });
            match loaded {
                Ok(catalog) => {
                    traversal.extend(catalog.regions);
                    plates.insert(
                        catalog.grid.plate_id.clone(),
                        Plate {
                            grid: catalog.grid,
                            source: catalog.source,
                        },
                    );
                }
                Err(e) => {
                    for (_, plate) in plates.drain() {
                        host.release(plate.source);
                    }
                    return Err(e);
                }
            }
        }

        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        traversal.shuffle(&mut rng);

        let mut session = Self {
            host,
            plates,
            traversal,
            cursor: None,
            scores: HashMap::new(),
            score_order: Vec::new(),
            contrast: options.default_contrast,
            open_image: None,
            options,
        };
        if let Err(e) = session.prepare() {
            session.release_images();
            return Err(e);
        }
        info!(
            "Session ready: {} regions on {} plates, {} already scored",
            session.traversal.len(),
            session.plates.len(),
            session.scores.len()
        );
        Ok(session)
    }

    fn prepare(&mut self) -> Result<()> {
        if self.traversal.is_empty() {
            return Err(ScoringError::EmptySession);
        }
        std::fs::create_dir_all(&self.options.thumb_dir)?;
        if self.options.score_file.is_file() {
            info!(
                "Restoring previous scores from {}",
                self.options.score_file.display()
            );
            self.restore_scores()?;
        }
        Ok(())
    }

    /// Rebuild the traversal around the scores already on disk.
    ///
    /// Restored regions come first in file order, followed by the regions
    /// nobody has scored yet in their shuffled order. The cursor lands on the
    /// last restored region so the next step opens the first unscored one.
    fn restore_scores(&mut self) -> Result<()> {
        let single_plate = match self.plates.len() {
            1 => self.plates.keys().next().cloned(),
            _ => None,
        };
        let restored = read_scores(&self.options.score_file, single_plate.as_deref())?;

        let known: HashSet<GridRegion> = self.traversal.iter().cloned().collect();
        let mut resumed: Vec<GridRegion> = Vec::new();
        let mut seen: HashSet<GridRegion> = HashSet::new();
        let mut orphaned = 0;
        let mut last_contrast = None;

        for score in restored {
            let region = score.region.clone();
            if known.contains(&region) {
                if seen.insert(region.clone()) {
                    resumed.push(region.clone());
                }
            } else {
                orphaned += 1;
            }
            last_contrast = Some(score.contrast);
            if self.scores.insert(region.clone(), score).is_none() {
                self.score_order.push(region);
            }
        }

        if orphaned > 0 {
            warn!(
                "{} restored scores match no region of the current grids; they are kept in the score file but will not be shown",
                orphaned
            );
        }
        info!(
            "Restored {} scores, {} of {} regions already scored",
            self.scores.len(),
            resumed.len(),
            self.traversal.len()
        );

        let remaining = self
            .traversal
            .iter()
            .filter(|region| !seen.contains(*region))
            .cloned();
        let mut traversal = resumed.clone();
        traversal.extend(remaining);
        self.traversal = traversal;
        self.cursor = resumed.len().checked_sub(1);
        if let Some(contrast) = last_contrast {
            self.contrast = contrast;
        }
        Ok(())
    }

    /// Open the region after the cursor.
    ///
    /// Returns [`Step::NoMoreRegions`] without touching any state once the
    /// traversal is exhausted.
    pub fn open_next(&mut self) -> Result<Step> {
        let next = self.cursor.map_or(0, |c| c + 1);
        if next >= self.traversal.len() {
            info!("No more regions");
            return Ok(Step::NoMoreRegions);
        }
        self.open_at(next)?;
        Ok(Step::Opened {
            score: self.current_score_text(),
        })
    }

    /// Open the region before the cursor, staying put on the first one.
    pub fn open_previous(&mut self) -> Result<String> {
        let cursor = self.cursor.ok_or(ScoringError::NothingOpen)?;
        if cursor > 0 {
            self.open_at(cursor - 1)?;
        } else if self.open_image.is_none() {
            self.open_at(0)?;
        }
        Ok(self.current_score_text())
    }

    fn open_at(&mut self, index: usize) -> Result<()> {
        if let Some(old) = self.open_image.take() {
            self.host.release(old);
        }
        self.cursor = Some(index);

        let region = &self.traversal[index];
        let plate = self
            .plates
            .get(&region.plate_id)
            .ok_or_else(|| ScoringError::UnknownPlate(region.plate_id.clone()))?;
        let (x, y, width, height) = region.crop_window(plate.grid.region_size)?;
        let mut image = self.host.crop(&plate.source, x, y, width, height)?;
        self.host.apply_contrast(&mut image, self.contrast);

        let thumb = self.options.thumb_dir.join(region.thumbnail_name());
        let saved = self.host.save_jpeg(&image, &thumb);
        self.open_image = Some(image);
        saved
    }

    /// Change either display bound, re-render the open region and rewrite
    /// its thumbnail. Bounds with `min >= max` are rejected unchanged.
    pub fn set_contrast(&mut self, min: Option<f64>, max: Option<f64>) -> Result<()> {
        self.contrast = self.contrast.with(min, max)?;
        let Some(image) = self.open_image.as_mut() else {
            return Ok(());
        };
        self.host.apply_contrast(image, self.contrast);
        self.save_thumbnail()
    }

    /// Take display bounds from the open region's histogram.
    pub fn auto_contrast(&mut self) -> Result<Contrast> {
        let image = self.open_image.as_mut().ok_or(ScoringError::NothingOpen)?;
        self.contrast = self.host.auto_contrast(image);
        self.save_thumbnail()?;
        Ok(self.contrast)
    }

    fn save_thumbnail(&mut self) -> Result<()> {
        let Some(thumb) = self
            .current_region()
            .map(|region| self.options.thumb_dir.join(region.thumbnail_name()))
        else {
            return Ok(());
        };
        match self.open_image.as_ref() {
            Some(image) => self.host.save_jpeg(image, &thumb),
            None => Ok(()),
        }
    }

    /// Record `text` for the region under the cursor and rewrite the score
    /// file. The region must have opened successfully.
    pub fn write_score(&mut self, text: &str) -> Result<()> {
        if self.open_image.is_none() {
            return Err(ScoringError::NothingOpen);
        }
        let region = self
            .current_region()
            .cloned()
            .ok_or(ScoringError::NothingOpen)?;
        let score = Score {
            region: region.clone(),
            contrast: self.contrast,
            text: text.to_string(),
        };
        if self.scores.insert(region.clone(), score).is_none() {
            self.score_order.push(region);
        }
        write_scores(&self.options.score_file, self.ordered_scores())
    }

    /// Release every image and write both reports.
    pub fn close(mut self) -> Result<ReportPaths> {
        self.release_images();

        let paths = self.options.report_paths();
        let report = self.options.report;
        let thumb_dir = self.options.thumb_dir.clone();
        write_report(&paths.by_score, self.ordered_scores(), &thumb_dir, &report, false)?;
        write_report(&paths.with_positions, self.ordered_scores(), &thumb_dir, &report, true)?;
        info!(
            "Session closed with {} scores; report written to {}",
            self.scores.len(),
            paths.by_score.display()
        );
        Ok(paths)
    }

    fn release_images(&mut self) {
        if let Some(image) = self.open_image.take() {
            self.host.release(image);
        }
        for (_, plate) in self.plates.drain() {
            self.host.release(plate.source);
        }
    }

    fn ordered_scores(&self) -> impl Iterator<Item = &Score> + '_ {
        self.score_order
            .iter()
            .filter_map(|region| self.scores.get(region))
    }

    fn current_score_text(&self) -> String {
        self.current_region()
            .and_then(|region| self.scores.get(region))
            .map(|score| score.text.clone())
            .unwrap_or_default()
    }

    pub fn current_region(&self) -> Option<&GridRegion> {
        self.cursor.and_then(|c| self.traversal.get(c))
    }

    pub fn current_image(&self) -> Option<&H::Image> {
        self.open_image.as_ref()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.traversal.len()
    }

    pub fn scored_count(&self) -> usize {
        self.scores.len()
    }

    pub fn contrast(&self) -> Contrast {
        self.contrast
    }

    pub fn score_for(&self, region: &GridRegion) -> Option<&Score> {
        self.scores.get(region)
    }

    pub fn traversal(&self) -> &[GridRegion] {
        &self.traversal
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }
}
