//! Run configuration, read from JSON.
//!
//! Only `model.name` and `train` are required. A minimal file:
//!
//! ```json
//! {
//!   "model": { "name": "evpwd_s" },
//!   "train": ["data/AirBase_800_*.csv"]
//! }
//! ```
//!
//! File patterns are resolved relative to the directory holding the
//! configuration file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{ConstraintKind, CurveType, ErrorKind};
use crate::error::{FitError, FitResult};
use crate::models::ModelKind;
use crate::optimization::{SearchSettings, SolverKind};
use crate::simulation::{MIN_DATA, SimSettings};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    /// Overrides for the fixed part of models that have one.
    #[serde(default)]
    pub fixed_params: BTreeMap<String, f64>,
}

/// A weighted error metric or constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermConfig {
    pub name: String,
    #[serde(rename = "type", default = "TermConfig::default_type")]
    pub curve_type: CurveType,
    #[serde(default = "TermConfig::default_weight")]
    pub weight: f64,
}

impl TermConfig {
    pub fn new(name: &str, curve_type: CurveType, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            curve_type,
            weight,
        }
    }

    fn default_type() -> CurveType {
        CurveType::Creep
    }
    fn default_weight() -> f64 {
        1.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default = "SolverConfig::default_kind")]
    pub kind: String,
    #[serde(default = "SolverConfig::default_generations")]
    pub generations: u32,
    #[serde(default = "SolverConfig::default_population")]
    pub population: usize,
    #[serde(default = "SolverConfig::default_offspring")]
    pub offspring: usize,
    #[serde(default = "SolverConfig::default_crossover")]
    pub crossover: f64,
    #[serde(default = "SolverConfig::default_mutation")]
    pub mutation: f64,
    #[serde(default)]
    pub seed: u64,
    /// Stop once the best fitness is below this value.
    #[serde(default)]
    pub target_fitness: Option<f64>,
    /// Generations without improvement before stopping; 0 disables.
    #[serde(default)]
    pub stagnation: u32,
    #[serde(default)]
    pub max_evaluations: Option<usize>,
}

impl SolverConfig {
    fn default_kind() -> String {
        "ga".to_string()
    }
    fn default_generations() -> u32 {
        10_000
    }
    fn default_population() -> usize {
        200
    }
    fn default_offspring() -> usize {
        100
    }
    fn default_crossover() -> f64 {
        0.65
    }
    fn default_mutation() -> f64 {
        0.35
    }

    pub fn kind(&self) -> FitResult<SolverKind> {
        SolverKind::from_name(&self.kind)
    }

    pub fn settings(&self, parallel: bool) -> SearchSettings {
        SearchSettings {
            generations: self.generations,
            population: self.population,
            offspring: self.offspring,
            crossover: self.crossover,
            mutation: self.mutation,
            precision: self.target_fitness.unwrap_or(0.0),
            stagnation: self.stagnation,
            seed: self.seed,
            parallel,
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: Self::default_kind(),
            generations: Self::default_generations(),
            population: Self::default_population(),
            offspring: Self::default_offspring(),
            crossover: Self::default_crossover(),
            mutation: Self::default_mutation(),
            seed: 0,
            target_fitness: None,
            stagnation: 0,
            max_evaluations: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    #[serde(default = "RecorderConfig::default_interval")]
    pub interval: u32,
    #[serde(default = "RecorderConfig::default_interval")]
    pub plot_interval: u32,
}

impl RecorderConfig {
    fn default_interval() -> u32 {
        10
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            interval: Self::default_interval(),
            plot_interval: Self::default_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    pub model: ModelConfig,
    pub train: Vec<String>,
    /// Scored for reporting only.
    #[serde(default)]
    pub validate: Vec<String>,
    #[serde(default = "FitConfig::default_errors")]
    pub errors: Vec<TermConfig>,
    #[serde(default = "FitConfig::default_constraints")]
    pub constraints: Vec<TermConfig>,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub worst_fitness: Option<f64>,
    #[serde(default = "FitConfig::default_min_samples")]
    pub min_samples: usize,
    #[serde(default)]
    pub eval_timeout_secs: Option<f64>,
    /// Worker threads; 0 uses every core.
    #[serde(default)]
    pub threads: usize,
    #[serde(default = "FitConfig::default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub initial_params: Option<Vec<f64>>,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl FitConfig {
    fn default_errors() -> Vec<TermConfig> {
        ["dy_area", "y_area", "x_end", "y_end"]
            .into_iter()
            .map(|name| TermConfig::new(name, CurveType::Creep, 1.0))
            .collect()
    }
    fn default_constraints() -> Vec<TermConfig> {
        ["dec_x_end", "inc_y_end"]
            .into_iter()
            .map(|name| TermConfig::new(name, CurveType::Creep, 1.0))
            .collect()
    }
    fn default_min_samples() -> usize {
        MIN_DATA
    }
    fn default_output_dir() -> PathBuf {
        PathBuf::from("results")
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> FitResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| FitError::io(path, e))?;
        let mut config: Self = serde_json::from_str(&text).map_err(|e| FitError::json(path, e))?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Reject unknown names and out-of-range settings before any work starts.
    pub fn validate(&self) -> FitResult<()> {
        ModelKind::from_name(&self.model.name)?;
        self.solver.kind()?;
        for term in &self.errors {
            ErrorKind::from_name(&term.name)?;
        }
        for term in &self.constraints {
            ConstraintKind::from_name(&term.name)?;
        }

        if self.train.is_empty() {
            return Err(FitError::Config("no training files given".into()));
        }
        if let Some(term) = self
            .errors
            .iter()
            .chain(&self.constraints)
            .find(|t| !t.weight.is_finite() || t.weight < 0.0)
        {
            return Err(FitError::Config(format!(
                "weight of '{}' must be a non-negative number, got {}",
                term.name, term.weight
            )));
        }

        let solver = &self.solver;
        if solver.generations == 0 {
            return Err(FitError::Config("solver.generations must be positive".into()));
        }
        if solver.population < 2 || solver.offspring == 0 {
            return Err(FitError::Config(
                "solver.population must be at least 2 and solver.offspring positive".into(),
            ));
        }
        for (name, p) in [("crossover", solver.crossover), ("mutation", solver.mutation)] {
            if !(0.0..=1.0).contains(&p) {
                return Err(FitError::Config(format!("solver.{name} must lie in [0, 1], got {p}")));
            }
        }
        if let Some(timeout) = self.eval_timeout_secs {
            if !(timeout.is_finite() && timeout > 0.0) {
                return Err(FitError::Config(format!("eval_timeout_secs must be positive, got {timeout}")));
            }
        }
        if self.min_samples == 0 {
            return Err(FitError::Config("min_samples must be positive".into()));
        }
        Ok(())
    }

    pub fn sim_settings(&self) -> SimSettings {
        SimSettings {
            min_samples: self.min_samples,
            timeout: self.eval_timeout_secs.map(Duration::from_secs_f64),
            ..SimSettings::default()
        }
    }

    /// Resolved worker count.
    pub fn thread_count(&self) -> usize {
        if self.threads == 0 { num_cpus::get() } else { self.threads }
    }
}
