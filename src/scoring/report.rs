//! HTML reports of thumbnails ordered by score

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

use super::error::Result;
use super::scores::write_atomic;
use super::types::Score;

/// Thin black lines instead of 3D borders
const TABLE_STYLE_THINBORDER: &str = "border: 1px solid #000000; border-collapse: collapse;";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    /// Thumbnails per table row
    pub columns: usize,
    /// `<font size>` of the score text
    pub text_size: u32,
    /// Rendered width and height of each thumbnail
    pub thumb_size: u32,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            columns: 5,
            text_size: 20,
            thumb_size: 300,
        }
    }
}

/// Minimal HTML table: rows of pre-rendered cell contents.
struct Table {
    columns: usize,
    rows: Vec<Vec<String>>,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "<TABLE border=\"1\" style=\"{}\" cellpadding=\"4\">",
            TABLE_STYLE_THINBORDER
        )?;
        for row in &self.rows {
            writeln!(f, " <TR>")?;
            for cell in row.iter().take(self.columns) {
                let text = if cell.is_empty() { "&nbsp;" } else { cell.as_str() };
                writeln!(f, "  <TD align=\"center\">{}</TD>", text)?;
            }
            writeln!(f, " </TR>")?;
        }
        write!(f, "</TABLE>")
    }
}

/// Finite number held by a score, if any. `NaN` and `inf` count as text.
fn numeric_value(score: &Score) -> Option<f64> {
    score
        .text
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Order scores by text, numerically when every non-empty score is a number.
/// The sort is stable, so ties keep their recorded order.
pub fn sort_scores<'a>(scores: impl IntoIterator<Item = &'a Score>) -> Vec<&'a Score> {
    let mut sorted: Vec<&Score> = scores.into_iter().collect();
    let numeric = sorted
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .all(|s| numeric_value(s).is_some());
    if numeric {
        sorted.sort_by(|a, b| match (numeric_value(a), numeric_value(b)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
    } else {
        sorted.sort_by(|a, b| a.text.cmp(&b.text));
    }
    sorted
}

/// Render the report table.
///
/// `thumb_dir` is only used for its final component, since the report lives
/// next to the thumbnail directory and links into it relatively.
pub fn render_report<'a>(
    scores: impl IntoIterator<Item = &'a Score>,
    thumb_dir: &Path,
    options: &ReportOptions,
    with_positions: bool,
) -> String {
    let columns = options.columns.max(1);
    let dir_name = thumb_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut rows = Vec::new();
    for chunk in sort_scores(scores).chunks(columns) {
        let mut images = Vec::with_capacity(chunk.len());
        let mut labels = Vec::with_capacity(chunk.len());
        for score in chunk {
            let src = if dir_name.is_empty() {
                score.region.thumbnail_name()
            } else {
                format!("{}/{}", dir_name, score.region.thumbnail_name())
            };
            images.push(format!(
                "<img src=\"{}\" width=\"{}\" height=\"{}\">",
                escape_html(&src),
                options.thumb_size,
                options.thumb_size
            ));
            let mut label = format!(
                "<font size='{}'>{}</font>",
                options.text_size,
                escape_html(&score.text)
            );
            if with_positions {
                label.push_str("<br>");
                label.push_str(&escape_html(&score.region.to_string()));
            }
            labels.push(label);
        }
        rows.push(images);
        rows.push(labels);
    }

    Table { columns, rows }.to_string()
}

pub fn write_report<'a>(
    path: &Path,
    scores: impl IntoIterator<Item = &'a Score>,
    thumb_dir: &Path,
    options: &ReportOptions,
    with_positions: bool,
) -> Result<()> {
    let html = render_report(scores, thumb_dir, options, with_positions);
    write_atomic(path, html.as_bytes())
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::types::{Contrast, GridRegion};

    fn score(col: u32, text: &str) -> Score {
        Score {
            region: GridRegion {
                plate_id: "img_g".to_string(),
                row: 1,
                col,
                x: "0".to_string(),
                y: "0".to_string(),
            },
            contrast: Contrast::default(),
            text: text.to_string(),
        }
    }

    fn texts(sorted: &[&Score]) -> Vec<String> {
        sorted.iter().map(|s| s.text.clone()).collect()
    }

    #[test]
    fn test_numeric_sort_when_all_numbers() {
        let scores = vec![score(1, "10"), score(2, "9"), score(3, ""), score(4, "2.5")];
        let sorted = sort_scores(&scores);
        assert_eq!(texts(&sorted), vec!["", "2.5", "9", "10"]);
    }

    #[test]
    fn test_text_sort_is_stable() {
        let scores = vec![score(1, "b"), score(2, "a"), score(3, "10"), score(4, "a")];
        let sorted = sort_scores(&scores);
        assert_eq!(texts(&sorted), vec!["10", "a", "a", "b"]);
        assert_eq!(sorted[1].region.col, 2);
        assert_eq!(sorted[2].region.col, 4);
    }

    #[test]
    fn test_nan_scores_fall_back_to_text_order() {
        let scores: Vec<Score> = (1..=30)
            .map(|c| {
                let text = if c % 7 == 0 { "NaN".to_string() } else { (100 - c).to_string() };
                score(c, &text)
            })
            .collect();
        let sorted = sort_scores(&scores);
        assert_eq!(sorted.len(), 30);
        let sorted_texts = texts(&sorted);
        let mut expected: Vec<String> = scores.iter().map(|s| s.text.clone()).collect();
        expected.sort();
        assert_eq!(sorted_texts, expected);

        let infinite = vec![score(1, "inf"), score(2, "3"), score(3, "20")];
        assert_eq!(texts(&sort_scores(&infinite)), vec!["20", "3", "inf"]);
    }

    #[test]
    fn test_report_wraps_rows() {
        let scores: Vec<Score> = (1..=7).map(|c| score(c, &c.to_string())).collect();
        let options = ReportOptions {
            columns: 3,
            ..Default::default()
        };
        let html = render_report(&scores, Path::new("/data/scores_cropped"), &options, false);

        assert_eq!(html.matches("<TR>").count(), 6);
        assert_eq!(html.matches("<img ").count(), 7);
        assert!(html.contains("<img src=\"scores_cropped/img_g_1_1.jpg\" width=\"300\" height=\"300\">"));
        assert!(html.contains("<font size='20'>7</font>"));
        assert!(!html.contains("row 1, col"));
        let first = html.find("img_g_1_1.jpg").unwrap();
        let seventh = html.find("img_g_1_7.jpg").unwrap();
        assert!(first < seventh);
    }

    #[test]
    fn test_positions_variant_and_escaping() {
        let scores = vec![score(2, "<b>&")];
        let html = render_report(&scores, Path::new("thumbs"), &ReportOptions::default(), true);
        assert!(html.contains("&lt;b&gt;&amp;</font><br>img_g: row 1, col 2"));
    }

    #[test]
    fn test_empty_report_is_bare_table() {
        let none: Vec<Score> = Vec::new();
        let html = render_report(&none, Path::new("thumbs"), &ReportOptions::default(), false);
        assert!(html.starts_with("<TABLE"));
        assert!(!html.contains("<TR>"));
    }
}
