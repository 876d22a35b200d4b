//! Region scoring core: grids, images, scores and reports

pub mod actions;
pub mod error;
pub mod grid;
pub mod host;
pub mod report;
pub mod scores;
pub mod session;
pub mod types;

pub use actions::{dispatch, ActionOutcome, ScoringAction};
pub use host::RasterHost;
pub use report::ReportOptions;
pub use session::{ReportPaths, ScoringSession, SessionOptions};
pub use types::Contrast;
