//! Main application state and UI

use eframe::egui;
use log::{info, warn};
use std::path::PathBuf;

use crate::scoring::{
    dispatch, ActionOutcome, Contrast, RasterHost, ReportPaths, ScoringAction, ScoringSession,
};
use crate::settings::Settings;

/// Application state
pub struct ScoringApp {
    settings: Settings,
    settings_path: Option<PathBuf>,

    // Setup screen
    grid_paths: Vec<PathBuf>,
    score_file_name: String,
    setup_error: Option<String>,
    last_report: Option<ReportPaths>,

    // Scoring screen
    session: Option<ScoringSession<RasterHost>>,
    score_field: String,
    min_field: String,
    max_field: String,
    notice: Option<String>,
    action_error: Option<String>,
    texture: Option<egui::TextureHandle>,
    texture_dirty: bool,
    focus_score: bool,

    // Deferred actions
    pending_action: Option<ScoringAction>,
    pending_start: bool,
    pending_finish: bool,
}

impl Default for ScoringApp {
    fn default() -> Self {
        let settings_path = Settings::default_path();
        let settings = Settings::load_or_default(settings_path.as_deref());
        Self::with_settings(settings, settings_path)
    }
}

impl ScoringApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        Self::default()
    }

    fn with_settings(settings: Settings, settings_path: Option<PathBuf>) -> Self {
        let contrast = Contrast {
            min: settings.default_min,
            max: settings.default_max,
        };
        Self {
            score_file_name: settings.score_file_name.clone(),
            settings,
            settings_path,
            grid_paths: Vec::new(),
            setup_error: None,
            last_report: None,
            session: None,
            score_field: String::new(),
            min_field: format_bound(contrast.min),
            max_field: format_bound(contrast.max),
            notice: None,
            action_error: None,
            texture: None,
            texture_dirty: false,
            focus_score: false,
            pending_action: None,
            pending_start: false,
            pending_finish: false,
        }
    }

    fn select_grid_files(&mut self) {
        let mut dialog = rfd::FileDialog::new()
            .set_title("Select grid files")
            .add_filter("Grid files", &["txt"]);
        if let Some(dir) = &self.settings.last_directory {
            dialog = dialog.set_directory(dir);
        }
        if let Some(paths) = dialog.pick_files() {
            self.grid_paths = paths;
            self.setup_error = None;
        }
    }

    fn save_settings(&self) {
        let Some(path) = &self.settings_path else {
            return;
        };
        if let Err(e) = self.settings.save(path) {
            warn!("{:#}", e);
        }
    }

    fn start_session(&mut self) {
        let Some(first) = self.grid_paths.first().cloned() else {
            return;
        };
        self.settings.score_file_name = self.score_file_name.trim().to_string();
        self.settings.last_directory = first.parent().map(|p| p.to_path_buf());
        self.save_settings();

        let session = self.settings.session_options(&first).and_then(|options| {
            ScoringSession::new(RasterHost, &self.grid_paths, options).map_err(anyhow::Error::from)
        });
        match session {
            Ok(session) => {
                info!(
                    "Scoring {} regions into {}",
                    session.len(),
                    session.options().score_file.display()
                );
                self.sync_contrast_fields(session.contrast());
                self.session = Some(session);
                self.setup_error = None;
                self.last_report = None;
                self.notice = None;
                self.action_error = None;
                self.score_field.clear();
                self.pending_action = Some(ScoringAction::Next);
            }
            Err(e) => {
                self.setup_error = Some(format!("{:#}", e));
            }
        }
    }

    fn finish_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.texture = None;
        self.pending_action = None;
        match session.close() {
            Ok(paths) => {
                self.last_report = Some(paths);
                self.setup_error = None;
            }
            Err(e) => {
                warn!("Failed to write report: {}", e);
                self.setup_error = Some(format!("Failed to write report: {}", e));
            }
        }
    }

    fn run_action(&mut self, action: ScoringAction) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let result = dispatch(session, action);
        let contrast = session.contrast();
        let region_open = session.current_image().is_some();
        match result {
            Ok(ActionOutcome { score_field, notice }) => {
                if let Some(text) = score_field {
                    self.score_field = text;
                }
                self.notice = notice;
                self.action_error = None;
            }
            Err(e) => {
                warn!("{}", e);
                self.action_error = Some(e.to_string());
                if !region_open {
                    self.score_field.clear();
                }
            }
        }
        self.sync_contrast_fields(contrast);
        self.texture_dirty = true;
        self.focus_score = true;
    }

    fn sync_contrast_fields(&mut self, contrast: Contrast) {
        self.min_field = format_bound(contrast.min);
        self.max_field = format_bound(contrast.max);
    }

    /// Queue a bound change typed into `field`, or restore the field when it
    /// does not hold a number.
    fn commit_bound(&mut self, is_min: bool) {
        let field = if is_min { &self.min_field } else { &self.max_field };
        match field.trim().parse::<f64>() {
            Ok(value) if is_min => self.pending_action = Some(ScoringAction::ChangedMin(value)),
            Ok(value) => self.pending_action = Some(ScoringAction::ChangedMax(value)),
            Err(_) => {
                self.action_error = Some(format!("'{}' is not a number", field.trim()));
                let contrast = self.session.as_ref().map(|s| s.contrast());
                if let Some(contrast) = contrast {
                    self.sync_contrast_fields(contrast);
                }
            }
        }
    }

    fn refresh_texture(&mut self, ctx: &egui::Context) {
        if !self.texture_dirty {
            return;
        }
        self.texture_dirty = false;
        let display = self
            .session
            .as_ref()
            .and_then(|s| s.current_image())
            .and_then(|image| image.display());
        self.texture = display.map(|rgb| {
            let size = [rgb.width() as usize, rgb.height() as usize];
            let image = egui::ColorImage::from_rgb(size, rgb.as_raw());
            ctx.load_texture("region", image, egui::TextureOptions::NEAREST)
        });
    }
}

fn format_bound(value: f64) -> String {
    format!("{}", value)
}

impl eframe::App for ScoringApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Closing the window finishes the session so the report gets written
        if ctx.input(|i| i.viewport().close_requested()) {
            self.finish_session();
        }

        if self.pending_start {
            self.pending_start = false;
            self.start_session();
        }

        if let Some(action) = self.pending_action.take() {
            self.run_action(action);
        }

        if self.pending_finish {
            self.pending_finish = false;
            self.finish_session();
        }

        self.refresh_texture(ctx);

        // Top menu bar
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    let idle = self.session.is_none();
                    if ui
                        .add_enabled(idle, egui::Button::new("Select Grid Files..."))
                        .clicked()
                    {
                        self.select_grid_files();
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui
                        .add_enabled(!idle, egui::Button::new("Finish and Write Report"))
                        .clicked()
                    {
                        self.pending_finish = true;
                        ui.close_menu();
                    }
                });
            });
        });

        // Status bar
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| match &self.session {
                Some(session) => {
                    let mut parts = Vec::new();
                    if let Some(cursor) = session.cursor() {
                        parts.push(format!("Region {} of {}", cursor + 1, session.len()));
                    }
                    parts.push(format!("{} scored", session.scored_count()));
                    if let Some(region) = session.current_region() {
                        parts.push(region.to_string());
                    }
                    ui.label(parts.join(" | "));
                }
                None => {
                    if self.grid_paths.is_empty() {
                        ui.label("Select grid files to begin");
                    } else {
                        ui.label(format!("{} grid files selected", self.grid_paths.len()));
                    }
                }
            });
        });

        // Main content
        egui::CentralPanel::default().show(ctx, |ui| {
            if self.session.is_some() {
                self.show_scoring(ui);
            } else {
                self.show_setup(ui);
            }
        });
    }
}

impl ScoringApp {
    fn show_setup(&mut self, ui: &mut egui::Ui) {
        ui.heading("Grid Files");
        ui.separator();

        ui.horizontal(|ui| {
            if ui.button("Select...").clicked() {
                self.select_grid_files();
            }
            if !self.grid_paths.is_empty() && ui.button("Clear").clicked() {
                self.grid_paths.clear();
            }
        });
        if self.grid_paths.is_empty() {
            ui.colored_label(egui::Color32::GRAY, "No grid files selected");
        } else {
            egui::ScrollArea::vertical()
                .max_height(200.0)
                .show(ui, |ui| {
                    for path in &self.grid_paths {
                        ui.label(path.display().to_string());
                    }
                });
        }

        ui.add_space(10.0);
        ui.horizontal(|ui| {
            ui.label("Score file:");
            ui.add(egui::TextEdit::singleline(&mut self.score_file_name).desired_width(200.0));
        });
        if let Some(first) = self.grid_paths.first() {
            let directory = first.parent().map(|p| p.display().to_string());
            ui.colored_label(
                egui::Color32::GRAY,
                format!("Saved in {}", directory.unwrap_or_default()),
            );
        }

        ui.add_space(10.0);
        let can_start = !self.grid_paths.is_empty() && !self.score_file_name.trim().is_empty();
        if ui
            .add_enabled(can_start, egui::Button::new("Start Scoring"))
            .clicked()
        {
            self.pending_start = true;
        }

        if let Some(error) = &self.setup_error {
            ui.colored_label(egui::Color32::RED, format!("Error: {}", error));
        }
        if let Some(report) = &self.last_report {
            ui.separator();
            ui.colored_label(
                egui::Color32::from_rgb(100, 200, 100),
                format!("Report written to {}", report.by_score.display()),
            );
            ui.label(report.with_positions.display().to_string());
        }
    }

    fn show_scoring(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Previous").clicked() {
                self.pending_action = Some(ScoringAction::Previous);
            }
            if ui.button("Next").clicked() {
                self.pending_action = Some(ScoringAction::Next);
            }
            ui.separator();

            ui.label("Min:");
            let min = ui.add(egui::TextEdit::singleline(&mut self.min_field).desired_width(60.0));
            if min.lost_focus() {
                self.commit_bound(true);
            }
            ui.label("Max:");
            let max = ui.add(egui::TextEdit::singleline(&mut self.max_field).desired_width(60.0));
            if max.lost_focus() {
                self.commit_bound(false);
            }
            if ui.button("Auto").clicked() {
                self.pending_action = Some(ScoringAction::AutoContrast);
            }
            ui.separator();

            ui.label("Score:");
            let score = ui.add(egui::TextEdit::singleline(&mut self.score_field).desired_width(120.0));
            if score.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                self.pending_action = Some(ScoringAction::ScoreAndAdvance(self.score_field.clone()));
            }
            if self.focus_score {
                self.focus_score = false;
                score.request_focus();
            }
            ui.separator();

            if ui.button("Finish").clicked() {
                self.pending_finish = true;
            }
        });

        if let Some(error) = &self.action_error {
            ui.colored_label(egui::Color32::RED, format!("Error: {}", error));
        }
        if let Some(notice) = &self.notice {
            ui.colored_label(egui::Color32::YELLOW, notice);
        }
        ui.separator();

        match &self.texture {
            Some(texture) => {
                let available = ui.available_size();
                let [w, h] = texture.size();
                let scale = (available.x / w as f32).min(available.y / h as f32).max(0.1);
                let size = egui::vec2(w as f32 * scale, h as f32 * scale);
                ui.centered_and_justified(|ui| {
                    ui.add(egui::Image::new(texture).fit_to_exact_size(size));
                });
            }
            None => {
                ui.colored_label(egui::Color32::GRAY, "No region open");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn app_with_plate(dir: &std::path::Path) -> ScoringApp {
        let source = GrayImage::from_fn(40, 20, |x, _| Luma([(x * 5) as u8]));
        source.save(dir.join("plate.png")).unwrap();
        std::fs::write(dir.join("plate_g.txt"), "1\t2\t20\n0\t0\n20\t0\n").unwrap();

        let settings = Settings {
            image_extensions: vec!["png".into()],
            ..Default::default()
        };
        let mut app = ScoringApp::with_settings(settings, None);
        app.grid_paths = vec![dir.join("plate_g.txt")];
        app
    }

    #[test]
    fn test_start_score_and_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_plate(dir.path());
        app.start_session();
        assert!(app.setup_error.is_none(), "{:?}", app.setup_error);

        let next = app.pending_action.take().unwrap();
        assert_eq!(next, ScoringAction::Next);
        app.run_action(next);
        assert!(app.texture_dirty);
        assert_eq!(app.score_field, "");

        app.run_action(ScoringAction::ScoreAndAdvance("3".into()));
        app.run_action(ScoringAction::ScoreAndAdvance("1".into()));
        assert_eq!(app.notice.as_deref(), Some("No more images"));

        app.finish_session();
        assert!(app.session.is_none());
        let report = app.last_report.clone().unwrap();
        assert!(report.by_score.is_file());
        assert!(dir.path().join("scores.csv").is_file());
        assert!(dir.path().join("scores_cropped").join("plate_g_1_2.jpg").is_file());
    }

    #[test]
    fn test_bad_bound_restores_field() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_plate(dir.path());
        app.start_session();
        app.run_action(ScoringAction::Next);

        app.min_field = "dark".into();
        app.commit_bound(true);
        assert!(app.pending_action.is_none());
        assert_eq!(app.min_field, "0");
        assert!(app.action_error.is_some());

        app.max_field = "0".into();
        app.commit_bound(false);
        let action = app.pending_action.take().unwrap();
        app.run_action(action);
        assert!(app.action_error.as_deref().unwrap_or_default().contains("0"));
        assert_eq!(app.max_field, "255");
    }

    #[test]
    fn test_failed_open_clears_score_field() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_plate(dir.path());
        std::fs::write(dir.path().join("plate_g.txt"), "1\t1\t20\nzz\t0\n").unwrap();
        app.start_session();
        app.score_field = "5".into();

        let next = app.pending_action.take().unwrap();
        app.run_action(next);
        assert!(app.action_error.is_some());
        assert_eq!(app.score_field, "");

        app.run_action(ScoringAction::ScoreAndAdvance("5".into()));
        assert!(app.action_error.is_some());
        let session = app.session.as_ref().unwrap();
        assert_eq!(session.scored_count(), 0);
    }

    #[test]
    fn test_failed_report_keeps_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_plate(dir.path());
        app.start_session();
        // A directory where the report file should go makes the write fail
        std::fs::create_dir(dir.path().join("scores.html")).unwrap();
        app.finish_session();
        assert!(app.session.is_none());
        assert!(app.last_report.is_none());
        assert!(app.setup_error.unwrap().starts_with("Failed to write report"));
    }

    #[test]
    fn test_missing_image_reported_on_setup() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_plate(dir.path());
        app.settings.image_extensions = vec!["tif".into()];
        app.start_session();
        assert!(app.session.is_none());
        assert!(app.setup_error.unwrap().contains("plate"));
    }
}
