//! Run directory and the files written into it.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use crate::core::Curve;
use crate::error::{FitError, FitResult};
use crate::optimization::problem::Term;

/// Timestamped directory holding everything one run produces.
#[derive(Clone, Debug)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    /// Create `<output_dir>/<yymmddHHMMSS>[ (title)]`.
    pub fn create(output_dir: &Path, title: Option<&str>) -> FitResult<Self> {
        let stamp = Local::now().format("%y%m%d%H%M%S").to_string();
        let name = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => format!("{stamp} ({title})"),
            None => stamp,
        };
        Self::at(output_dir.join(name))
    }

    /// Use `path` as the run directory, creating it if needed.
    pub fn at(path: PathBuf) -> FitResult<Self> {
        fs::create_dir_all(&path).map_err(|e| FitError::io(&path, e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> FitResult<PathBuf> {
        let path = self.file(name);
        let file = File::create(&path).map_err(|e| FitError::io(&path, e))?;
        serde_json::to_writer_pretty(file, value).map_err(|e| FitError::json(&path, e))?;
        Ok(path)
    }
}

/// Best parameters and their score, as written to `params.json`.
#[derive(Clone, Debug, Serialize)]
pub struct ParamRecord {
    pub model: String,
    pub iteration: u32,
    pub evaluations: usize,
    pub failed_evaluations: usize,
    pub fitness: f64,
    pub params: Vec<NamedValue>,
    pub terms: Vec<Term>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NamedValue {
    pub name: String,
    pub value: f64,
}

impl NamedValue {
    pub fn zip(names: &[String], values: &[f64]) -> Vec<Self> {
        names
            .iter()
            .zip(values)
            .map(|(name, &value)| Self {
                name: name.clone(),
                value,
            })
            .collect()
    }
}

/// Score of the best parameters on the held-out curves.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationRecord {
    pub curves: Vec<String>,
    pub fitness: f64,
    pub terms: Vec<Term>,
}

/// One row of `history.csv`.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryRow {
    pub iteration: u32,
    pub evaluations: usize,
    pub fitness: f64,
    pub params: Vec<f64>,
}

pub fn write_history(path: &Path, names: &[String], rows: &[HistoryRow]) -> FitResult<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| FitError::csv(path, e))?;

    let mut header = vec!["iteration".to_string(), "evaluations".to_string(), "fitness".to_string()];
    header.extend(names.iter().cloned());
    writer.write_record(&header).map_err(|e| FitError::csv(path, e))?;

    for row in rows {
        let mut record = vec![
            row.iteration.to_string(),
            row.evaluations.to_string(),
            format!("{:e}", row.fitness),
        ];
        record.extend(row.params.iter().map(|p| format!("{p:e}")));
        writer.write_record(&record).map_err(|e| FitError::csv(path, e))?;
    }
    writer.flush().map_err(|e| FitError::io(path, e))
}

/// Write curves in the layout the loader reads: conditions on the first row
/// of each curve, samples below. Several curves share one file, each starting
/// a new condition row; `read_curve_file` splits them again.
pub fn write_curves_csv(path: &Path, curves: &[Curve]) -> FitResult<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| FitError::csv(path, e))?;
    writer
        .write_record(["x", "y", "temp", "stress", "type", "title"])
        .map_err(|e| FitError::csv(path, e))?;

    for curve in curves {
        for (i, (x, y)) in curve.points().enumerate() {
            let record = if i == 0 {
                [
                    x.to_string(),
                    y.to_string(),
                    curve.temp.to_string(),
                    curve.stress.to_string(),
                    curve.curve_type.to_string(),
                    curve.test_id.clone(),
                ]
            } else {
                [x.to_string(), y.to_string(), String::new(), String::new(), String::new(), String::new()]
            };
            writer.write_record(&record).map_err(|e| FitError::csv(path, e))?;
        }
    }
    writer.flush().map_err(|e| FitError::io(path, e))
}
