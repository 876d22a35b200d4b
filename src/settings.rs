//! Persistent user settings

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::scoring::{Contrast, ReportOptions, SessionOptions};

/// Environment variable overriding the settings file location.
pub const SETTINGS_ENV: &str = "CCM_SCORING_SETTINGS";
const SETTINGS_FILE: &str = ".ccm_scoring.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub report_columns: usize,
    pub report_text_size: u32,
    pub thumb_size: u32,
    pub default_min: f64,
    pub default_max: f64,
    pub image_extensions: Vec<String>,
    pub score_file_name: String,
    /// Directory the grid dialog opens in
    pub last_directory: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let report = ReportOptions::default();
        let contrast = Contrast::default();
        Self {
            report_columns: report.columns,
            report_text_size: report.text_size,
            thumb_size: report.thumb_size,
            default_min: contrast.min,
            default_max: contrast.max,
            image_extensions: vec!["tif".into(), "tiff".into()],
            score_file_name: "scores.csv".into(),
            last_directory: None,
        }
    }
}

impl Settings {
    /// `$CCM_SCORING_SETTINGS`, else `~/.ccm_scoring.json`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(SETTINGS_ENV) {
            return Some(PathBuf::from(path));
        }
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(|home| PathBuf::from(home).join(SETTINGS_FILE))
    }

    /// Read settings from `path`, using defaults when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
        Ok(settings)
    }

    /// Like [`Settings::load`] but falls back to defaults on any error.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("{:#}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    /// Session options for a score file placed next to the first grid.
    pub fn session_options(&self, first_grid: &Path) -> Result<SessionOptions> {
        let directory = first_grid.parent().unwrap_or_else(|| Path::new(""));
        let score_file = directory.join(self.score_file_name.trim());
        let mut options = SessionOptions::for_score_file(score_file);
        options.image_extensions = self.image_extensions.clone();
        options.default_contrast = Contrast::new(self.default_min, self.default_max)
            .context("Invalid default display range in settings")?;
        options.report = ReportOptions {
            columns: self.report_columns,
            text_size: self.report_text_size,
            thumb_size: self.thumb_size,
        };
        Ok(options)
    }
}
