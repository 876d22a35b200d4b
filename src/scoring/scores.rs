//! Score file reading and writing
//!
//! The file is comma separated with the header
//! `plate,row,col,x,y,min,max,score` and is rewritten in full on every
//! score, through a temporary file renamed over the old one.

use log::debug;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use super::error::{Result, ScoringError};
use super::types::{Contrast, GridRegion, Score};

pub const HEADER: [&str; 8] = ["plate", "row", "col", "x", "y", "min", "max", "score"];

/// Header of score files written for a single grid, before plates existed.
pub const LEGACY_HEADER: [&str; 7] = ["row", "col", "x", "y", "min", "max", "score"];

/// Replace `path` with `bytes` so readers only ever see a complete file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn write_scores<'a>(path: &Path, scores: impl IntoIterator<Item = &'a Score>) -> Result<()> {
    let mut out = String::new();
    out.push_str(&HEADER.join(","));
    out.push('\n');
    let mut count = 0;
    for score in scores {
        let r = &score.region;
        let fields = [
            csv_escape(&r.plate_id),
            r.row.to_string(),
            r.col.to_string(),
            csv_escape(&r.x),
            csv_escape(&r.y),
            score.contrast.min.to_string(),
            score.contrast.max.to_string(),
            csv_escape(&score.text),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
        count += 1;
    }
    write_atomic(path, out.as_bytes())?;
    debug!("Wrote {} scores to {}", count, path.display());
    Ok(())
}

/// Read every record of a score file, in file order.
///
/// `single_plate` names the plate to attach to rows of a legacy file; legacy
/// files are rejected when it is `None`.
pub fn read_scores(path: &Path, single_plate: Option<&str>) -> Result<Vec<Score>> {
    let content = std::fs::read_to_string(path)?;
    let corrupt = |line: usize, reason: String| ScoringError::CorruptScoreFile {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut records = parse_records(&content).into_iter();
    let Some((_, header)) = records.next() else {
        return Ok(Vec::new());
    };
    let legacy = if header == HEADER {
        false
    } else if header == LEGACY_HEADER {
        if single_plate.is_none() {
            return Err(corrupt(
                1,
                "file without a plate column needs exactly one grid".to_string(),
            ));
        }
        true
    } else {
        return Err(corrupt(1, format!("unexpected header {:?}", header)));
    };

    let expected = if legacy { LEGACY_HEADER.len() } else { HEADER.len() };
    let mut scores = Vec::new();
    for (line, mut fields) in records {
        if fields.len() != expected {
            return Err(corrupt(
                line,
                format!("expected {} fields, found {}", expected, fields.len()),
            ));
        }
        if legacy {
            fields.insert(0, single_plate.unwrap_or_default().to_string());
        }
        let number = |idx: usize| -> Result<f64> {
            fields[idx]
                .parse::<f64>()
                .map_err(|_| corrupt(line, format!("{} '{}' is not a number", HEADER[idx], fields[idx])))
        };
        let index = |idx: usize| -> Result<u32> {
            fields[idx]
                .parse::<u32>()
                .map_err(|_| corrupt(line, format!("{} '{}' is not an integer", HEADER[idx], fields[idx])))
        };
        let (row, col) = (index(1)?, index(2)?);
        let (min, max) = (number(5)?, number(6)?);
        let contrast = Contrast::new(min, max).map_err(|e| corrupt(line, e.to_string()))?;
        let [plate_id, _, _, x, y, _, _, text]: [String; 8] = fields
            .try_into()
            .map_err(|_| corrupt(line, "wrong field count".to_string()))?;
        scores.push(Score {
            region: GridRegion {
                plate_id,
                row,
                col,
                x,
                y,
            },
            contrast,
            text,
        });
    }
    Ok(scores)
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Split CSV text into records, honouring quoted fields that contain commas,
/// quotes or line breaks. Each record carries the line number it starts on.
/// Blank lines are skipped.
fn parse_records(content: &str) -> Vec<(usize, Vec<String>)> {
    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut start_line = 1;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                if !fields.is_empty() || !field.is_empty() {
                    fields.push(std::mem::take(&mut field));
                    records.push((start_line, std::mem::take(&mut fields)));
                }
                line += 1;
                start_line = line;
            }
            _ => field.push(c),
        }
    }
    if !fields.is_empty() || !field.is_empty() {
        fields.push(field);
        records.push((start_line, fields));
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn score(plate: &str, row: u32, col: u32, text: &str) -> Score {
        Score {
            region: GridRegion {
                plate_id: plate.to_string(),
                row,
                col,
                x: (col * 10).to_string(),
                y: (row * 10).to_string(),
            },
            contrast: Contrast::default(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_write_then_read_preserves_order_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.csv");
        let scores = vec![
            score("a_1", 1, 1, "3"),
            score("a_1", 1, 2, "tiny, \"wrinkled\""),
            score("b_1", 2, 1, ""),
        ];
        write_scores(&path, &scores).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("plate,row,col,x,y,min,max,score\n"));
        assert!(text.contains("a_1,1,1,10,10,0,255,3\n"));

        let read = read_scores(&path, None).unwrap();
        assert_eq!(read, scores);
    }

    #[test]
    fn test_last_write_wins_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.csv");
        let mut model: HashMap<GridRegion, String> = HashMap::new();
        let mut order: Vec<GridRegion> = Vec::new();
        let writes = [(1, "2"), (2, "4"), (1, "5"), (3, "1"), (2, "multi\nline")];

        for (col, text) in writes {
            let s = score("a_1", 1, col, text);
            if model.insert(s.region.clone(), text.to_string()).is_none() {
                order.push(s.region.clone());
            }
            let current: Vec<Score> = order
                .iter()
                .map(|r| Score {
                    region: r.clone(),
                    contrast: Contrast::default(),
                    text: model[r].clone(),
                })
                .collect();
            write_scores(&path, &current).unwrap();

            let read = read_scores(&path, None).unwrap();
            let read: HashMap<GridRegion, String> =
                read.into_iter().map(|s| (s.region, s.text)).collect();
            assert_eq!(read, model);
        }
    }

    #[test]
    fn test_legacy_header_needs_single_plate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.csv");
        std::fs::write(&path, "row,col,x,y,min,max,score\n1,2,10,0,0,255,big\n").unwrap();

        assert!(matches!(
            read_scores(&path, None),
            Err(ScoringError::CorruptScoreFile { .. })
        ));
        let read = read_scores(&path, Some("img_g")).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].region.plate_id, "img_g");
        assert_eq!((read[0].region.row, read[0].region.col), (1, 2));
        assert_eq!(read[0].text, "big");
    }

    #[test]
    fn test_corrupt_rows_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.csv");
        let cases = [
            "plate,row,col,x,y,min,max,score\na_1,1,1,0,0,0,255\n",
            "plate,row,col,x,y,min,max,score\na_1,one,1,0,0,0,255,3\n",
            "plate,row,col,x,y,min,max,score\na_1,1,1,0,0,lo,255,3\n",
            "plate,row,col,x,y,min,max,score\na_1,1,1,0,0,9,2,3\n",
            "foo,bar\n",
        ];
        for body in cases {
            std::fs::write(&path, body).unwrap();
            match read_scores(&path, None) {
                Err(ScoringError::CorruptScoreFile { line, .. }) => {
                    assert!(line == 1 || line == 2, "{:?}", body)
                }
                other => panic!("{:?}: {:?}", body, other),
            }
        }
    }

    #[test]
    fn test_header_only_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.csv");
        std::fs::write(&path, "plate,row,col,x,y,min,max,score\n").unwrap();
        assert!(read_scores(&path, None).unwrap().is_empty());
        std::fs::write(&path, "").unwrap();
        assert!(read_scores(&path, None).unwrap().is_empty());
    }

    #[test]
    fn test_atomic_write_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "old contents that are longer").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
