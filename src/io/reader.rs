//! Experimental curve loader.
//!
//! CSV files with the header `x,y,temp,stress,type,title`. The test
//! conditions sit on the first data row of a test (`0,0,800,60,creep,G32`)
//! and the remaining rows only fill `x` and `y`. A later row that carries
//! conditions again starts the next test of the same file. Files written
//! without the condition columns can carry them in their name instead:
//! `Air800C80MPa_G25.csv` or `AirBase_800_80_G25.csv` (temperature first,
//! then stress).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use csv::StringRecord;
use regex::Regex;
use tracing::{debug, warn};

use crate::core::{Curve, CurveType};
use crate::error::{FitError, FitResult};

static NAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(\d+(?:\.\d+)?)C(\d+(?:\.\d+)?)MPa",
        r"_(\d+(?:\.\d+)?)_(\d+(?:\.\d+)?)(?:_|$)",
    ]
    .into_iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Test conditions read from a file, before defaults are applied.
#[derive(Debug, Default)]
struct Conditions {
    temp: Option<f64>,
    stress: Option<f64>,
    curve_type: Option<CurveType>,
    title: Option<String>,
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().trim_start_matches('\u{feff}').to_lowercase(), idx))
        .collect()
}

fn field<'r>(record: &'r StringRecord, columns: &HashMap<String, usize>, name: &str) -> Option<&'r str> {
    columns
        .get(name)
        .and_then(|&idx| record.get(idx))
        .filter(|value| !value.is_empty())
}

fn parse_number(value: &str, path: &Path, line: usize, column: &str) -> FitResult<f64> {
    value.parse::<f64>().map_err(|_| FitError::InvalidCurve {
        test: path.display().to_string(),
        reason: format!("line {line}: '{value}' in column '{column}' is not a number"),
    })
}

/// Temperature and stress encoded in a file name.
pub fn conditions_from_name(name: &str) -> Option<(f64, f64)> {
    NAME_PATTERNS.iter().find_map(|pattern| {
        let captures = pattern.captures(name)?;
        let temp = captures.get(1)?.as_str().parse().ok()?;
        let stress = captures.get(2)?.as_str().parse().ok()?;
        Some((temp, stress))
    })
}

/// Rows of one test inside a file.
#[derive(Debug, Default)]
struct Block {
    conditions: Conditions,
    x: Vec<f64>,
    y: Vec<f64>,
}

fn has_conditions(record: &StringRecord, columns: &HashMap<String, usize>) -> bool {
    ["temp", "stress", "type", "title"]
        .iter()
        .any(|name| field(record, columns, name).is_some())
}

fn read_blocks(path: &Path) -> FitResult<Vec<Block>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| FitError::csv(path, e))?;

    let headers = reader.headers().map_err(|e| FitError::csv(path, e))?.clone();
    let columns = build_header_map(&headers);
    for required in ["x", "y"] {
        if !columns.contains_key(required) {
            return Err(FitError::InvalidCurve {
                test: path.display().to_string(),
                reason: format!("missing '{required}' column"),
            });
        }
    }

    let mut blocks = vec![Block::default()];
    for (idx, result) in reader.records().enumerate() {
        // +2: 1-based lines and the header row
        let line = idx + 2;
        let record = result.map_err(|e| FitError::csv(path, e))?;

        if has_conditions(&record, &columns) && blocks.last().is_some_and(|b| !b.x.is_empty()) {
            blocks.push(Block::default());
        }
        let Some(block) = blocks.last_mut() else {
            continue;
        };
        let conditions = &mut block.conditions;

        if conditions.temp.is_none() {
            if let Some(value) = field(&record, &columns, "temp") {
                conditions.temp = Some(parse_number(value, path, line, "temp")?);
            }
        }
        if conditions.stress.is_none() {
            if let Some(value) = field(&record, &columns, "stress") {
                conditions.stress = Some(parse_number(value, path, line, "stress")?);
            }
        }
        if conditions.curve_type.is_none() {
            if let Some(value) = field(&record, &columns, "type") {
                conditions.curve_type = Some(value.parse()?);
            }
        }
        if conditions.title.is_none() {
            conditions.title = field(&record, &columns, "title").map(str::to_string);
        }

        match (field(&record, &columns, "x"), field(&record, &columns, "y")) {
            (Some(xv), Some(yv)) => {
                block.x.push(parse_number(xv, path, line, "x")?);
                block.y.push(parse_number(yv, path, line, "y")?);
            }
            (None, None) => {}
            _ => {
                return Err(FitError::InvalidCurve {
                    test: path.display().to_string(),
                    reason: format!("line {line}: x and y must both be present"),
                });
            }
        }
    }
    Ok(blocks)
}

fn finish_block(path: &Path, block: Block) -> FitResult<Curve> {
    let Block { mut conditions, x, y } = block;
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if conditions.temp.is_none() || conditions.stress.is_none() {
        if let Some((temp, stress)) = conditions_from_name(file_name) {
            debug!(file = file_name, temp, stress, "test conditions taken from the file name");
            conditions.temp = conditions.temp.or(Some(temp));
            conditions.stress = conditions.stress.or(Some(stress));
        }
    }

    let (Some(temp), Some(stress)) = (conditions.temp, conditions.stress) else {
        return Err(FitError::InvalidCurve {
            test: path.display().to_string(),
            reason: "no temperature/stress in the file or its name".into(),
        });
    };
    let curve_type = conditions.curve_type.unwrap_or_else(|| {
        warn!(file = file_name, "no test type given, assuming creep");
        CurveType::Creep
    });
    let title = conditions.title.unwrap_or_else(|| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unnamed")
            .to_string()
    });

    let curve = Curve::new(x, y, curve_type, stress, temp, title)?;
    if curve.len() < 2 {
        return Err(FitError::InvalidCurve {
            test: curve.test_id,
            reason: "fewer than two samples".into(),
        });
    }
    Ok(curve)
}

/// Load every test stored in one file, in file order.
pub fn read_curve_file(path: &Path) -> FitResult<Vec<Curve>> {
    read_blocks(path)?
        .into_iter()
        .map(|block| finish_block(path, block))
        .collect()
}

/// Load a file holding exactly one experimental curve.
pub fn read_curve(path: &Path) -> FitResult<Curve> {
    let mut curves = read_curve_file(path)?;
    if curves.len() != 1 {
        return Err(FitError::InvalidCurve {
            test: path.display().to_string(),
            reason: format!("expected one test, found {}", curves.len()),
        });
    }
    Ok(curves.remove(0))
}

/// Expand file patterns relative to `base`.
///
/// Plain paths are kept as given. Glob patterns expand in sorted order and
/// must match at least one file.
pub fn expand_patterns(patterns: &[String], base: &Path) -> FitResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let joined = base.join(pattern);
        let text = joined.to_string_lossy();
        if !text.contains(['*', '?', '[']) {
            paths.push(joined);
            continue;
        }

        let mut matches: Vec<PathBuf> = glob::glob(&text)
            .map_err(|e| FitError::Config(format!("bad file pattern '{pattern}': {e}")))?
            .filter_map(Result::ok)
            .collect();
        if matches.is_empty() {
            return Err(FitError::NoMatch(pattern.clone()));
        }
        matches.sort();
        paths.extend(matches);
    }
    Ok(paths)
}

/// Load every curve named by `patterns`, in order.
pub fn read_curves(patterns: &[String], base: &Path) -> FitResult<Vec<Curve>> {
    let mut curves = Vec::new();
    for path in expand_patterns(patterns, base)? {
        curves.extend(read_curve_file(&path)?);
    }
    Ok(curves)
}
