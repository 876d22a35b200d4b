//! Operator actions and their effect on a session
//!
//! The window never calls session methods directly; it turns button presses
//! and text edits into a [`ScoringAction`] and shows the [`ActionOutcome`].

use super::error::Result;
use super::host::ImageHost;
use super::session::ScoringSession;
use super::types::Step;

pub const NO_MORE_IMAGES: &str = "No more images";

#[derive(Debug, Clone, PartialEq)]
pub enum ScoringAction {
    Next,
    Previous,
    /// Record the score field for the open region, then move on
    ScoreAndAdvance(String),
    ChangedMin(f64),
    ChangedMax(f64),
    AutoContrast,
}

/// What the window should show after an action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    /// New content of the score field, when it changes
    pub score_field: Option<String>,
    pub notice: Option<String>,
}

impl ActionOutcome {
    fn score(text: String) -> Self {
        Self {
            score_field: Some(text),
            notice: None,
        }
    }

    fn notice(text: &str) -> Self {
        Self {
            score_field: None,
            notice: Some(text.to_string()),
        }
    }

    fn from_step(step: Step) -> Self {
        match step {
            Step::Opened { score } => Self::score(score),
            Step::NoMoreRegions => Self::notice(NO_MORE_IMAGES),
        }
    }
}

pub fn dispatch<H: ImageHost>(
    session: &mut ScoringSession<H>,
    action: ScoringAction,
) -> Result<ActionOutcome> {
    match action {
        ScoringAction::Next => session.open_next().map(ActionOutcome::from_step),
        ScoringAction::Previous => session.open_previous().map(ActionOutcome::score),
        ScoringAction::ScoreAndAdvance(text) => {
            session.write_score(&text)?;
            session.open_next().map(ActionOutcome::from_step)
        }
        ScoringAction::ChangedMin(min) => {
            session.set_contrast(Some(min), None)?;
            Ok(ActionOutcome::default())
        }
        ScoringAction::ChangedMax(max) => {
            session.set_contrast(None, Some(max))?;
            Ok(ActionOutcome::default())
        }
        ScoringAction::AutoContrast => {
            session.auto_contrast()?;
            Ok(ActionOutcome::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::error::ScoringError;
    use crate::scoring::host::testing::MemoryHost;
    use crate::scoring::session::SessionOptions;
    use crate::scoring::types::Contrast;
    use std::path::PathBuf;

    fn setup(dir: &std::path::Path, cols: u32) -> (Vec<PathBuf>, SessionOptions) {
        let mut body = format!("1\t{}\t8\n", cols);
        for c in 0..cols {
            body.push_str(&format!("{}\t0\n", c * 8));
        }
        let grid = dir.join("img_g.txt");
        std::fs::write(&grid, body).unwrap();
        std::fs::write(dir.join("img.tif"), b"").unwrap();
        let mut options = SessionOptions::for_score_file(dir.join("scores.csv"));
        options.seed = Some(7);
        (vec![grid], options)
    }

    #[test]
    fn test_score_and_advance_walks_to_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let (grids, options) = setup(dir.path(), 2);
        let mut host = MemoryHost::default();
        let mut session = ScoringSession::new(&mut host, &grids, options).unwrap();

        let first = dispatch(&mut session, ScoringAction::Next).unwrap();
        assert_eq!(first.score_field.as_deref(), Some(""));

        let second = dispatch(&mut session, ScoringAction::ScoreAndAdvance("4".into())).unwrap();
        assert_eq!(second, ActionOutcome::score(String::new()));

        let done = dispatch(&mut session, ScoringAction::ScoreAndAdvance("2".into())).unwrap();
        assert_eq!(done.notice.as_deref(), Some(NO_MORE_IMAGES));
        assert_eq!(done.score_field, None);
        assert_eq!(session.scored_count(), 2);

        // Scoring again at the end overwrites the last region
        dispatch(&mut session, ScoringAction::ScoreAndAdvance("3".into())).unwrap();
        assert_eq!(session.scored_count(), 2);

        let back = dispatch(&mut session, ScoringAction::Previous).unwrap();
        assert_eq!(back.score_field.as_deref(), Some("4"));
    }

    #[test]
    fn test_contrast_actions() {
        let dir = tempfile::tempdir().unwrap();
        let (grids, options) = setup(dir.path(), 1);
        let mut host = MemoryHost::default();
        let mut session = ScoringSession::new(&mut host, &grids, options).unwrap();
        dispatch(&mut session, ScoringAction::Next).unwrap();

        dispatch(&mut session, ScoringAction::ChangedMax(100.0)).unwrap();
        dispatch(&mut session, ScoringAction::ChangedMin(10.0)).unwrap();
        assert_eq!(session.contrast(), Contrast { min: 10.0, max: 100.0 });

        assert!(matches!(
            dispatch(&mut session, ScoringAction::ChangedMin(100.0)),
            Err(ScoringError::InvalidContrast { .. })
        ));
        assert_eq!(session.contrast(), Contrast { min: 10.0, max: 100.0 });

        let outcome = dispatch(&mut session, ScoringAction::AutoContrast).unwrap();
        assert_eq!(outcome, ActionOutcome::default());
        assert_eq!(session.contrast(), Contrast { min: 5.0, max: 200.0 });
    }

    #[test]
    fn test_score_before_opening_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (grids, options) = setup(dir.path(), 1);
        let mut host = MemoryHost::default();
        let mut session = ScoringSession::new(&mut host, &grids, options).unwrap();
        assert!(matches!(
            dispatch(&mut session, ScoringAction::ScoreAndAdvance("1".into())),
            Err(ScoringError::NothingOpen)
        ));
        assert!(matches!(
            dispatch(&mut session, ScoringAction::AutoContrast),
            Err(ScoringError::NothingOpen)
        ));
    }
}
