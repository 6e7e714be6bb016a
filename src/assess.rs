//! Parameter-space assessment.
//!
//! Draws random in-bounds parameter vectors, runs the model on a handful of
//! test conditions and records which vectors give usable curves. Useful for
//! narrowing bounds before a calibration.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::core::{CurveType, bounds_of};
use crate::error::{FitError, FitResult};
use crate::io::RunDirectory;
use crate::io::plot;
use crate::models::ModelAdapter;
use crate::simulation::SimSeries;

pub const SUMMARY_BINS: usize = 10;

#[derive(Clone, Debug, PartialEq)]
pub struct AssessSettings {
    pub trials: usize,
    pub seed: u64,
    pub parallel: bool,
}

impl Default for AssessSettings {
    fn default() -> Self {
        Self {
            trials: 10,
            seed: 0,
            parallel: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Trial {
    pub params: Vec<f64>,
    pub valid: bool,
}

/// Valid and total trial counts of one parameter, split into equal-width
/// bins over its range.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamBins {
    pub name: String,
    pub edges: Vec<f64>,
    pub total: Vec<usize>,
    pub valid: Vec<usize>,
}

impl ParamBins {
    /// Fraction of valid trials per bin; `None` for empty bins.
    pub fn fractions(&self) -> Vec<Option<f64>> {
        self.total
            .iter()
            .zip(&self.valid)
            .map(|(&t, &v)| (t > 0).then(|| v as f64 / t as f64))
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct Assessment {
    pub names: Vec<String>,
    pub bounds: Vec<(f64, f64)>,
    pub trials: Vec<Trial>,
}

impl Assessment {
    pub fn valid_count(&self) -> usize {
        self.trials.iter().filter(|t| t.valid).count()
    }

    pub fn bins(&self, count: usize) -> Vec<ParamBins> {
        let count = count.max(1);
        self.names
            .iter()
            .zip(&self.bounds)
            .enumerate()
            .map(|(i, (name, &(min, max)))| {
                let width = (max - min) / count as f64;
                let mut bins = ParamBins {
                    name: name.clone(),
                    edges: (0..=count).map(|k| min + width * k as f64).collect(),
                    total: vec![0; count],
                    valid: vec![0; count],
                };
                for trial in &self.trials {
                    let slot = if width > 0.0 {
                        (((trial.params[i] - min) / width).floor().max(0.0) as usize).min(count - 1)
                    } else {
                        0
                    };
                    bins.total[slot] += 1;
                    if trial.valid {
                        bins.valid[slot] += 1;
                    }
                }
                bins
            })
            .collect()
    }
}

/// A run is usable when it is long enough, finite, and keeps both damage and
/// strain inside [0, 1].
pub fn is_usable(series: &SimSeries, curve_type: CurveType, min_samples: usize) -> bool {
    let strain = match curve_type {
        CurveType::Creep => &series.y,
        CurveType::Tensile => &series.x,
    };
    let unit = |v: &f64| (0.0..=1.0).contains(v);
    series.len() >= min_samples
        && series.x.iter().chain(&series.y).all(|v| v.is_finite())
        && series.damage.iter().all(unit)
        && strain.iter().all(unit)
}

fn run_trial(adapter: &ModelAdapter, params: Vec<f64>) -> FitResult<Trial> {
    let material = adapter.material(&params)?;
    let conditions = adapter.exp_curves();
    let valid = match adapter.simulate(&material, conditions) {
        Ok(series) => series
            .iter()
            .zip(conditions.iter())
            .all(|(s, c)| is_usable(s, c.curve_type, adapter.settings().min_samples)),
        Err(e) => {
            debug!(error = %e, "trial did not converge");
            false
        }
    };
    Ok(Trial { params, valid })
}

/// Sample `settings.trials` vectors uniformly inside the model bounds and run
/// each against the adapter's conditions.
pub fn assess(adapter: &ModelAdapter, settings: &AssessSettings) -> FitResult<Assessment> {
    if adapter.exp_curves().is_empty() {
        return Err(FitError::Config("assessment needs at least one test condition".into()));
    }
    let bounds = bounds_of(adapter.param_info());

    // Drawn up front so the sample does not depend on the thread count
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let samples: Vec<Vec<f64>> = (0..settings.trials)
        .map(|_| {
            bounds
                .iter()
                .map(|&(min, max)| if max > min { rng.gen_range(min..=max) } else { min })
                .collect()
        })
        .collect();

    let trials: Vec<Trial> = if settings.parallel {
        samples
            .into_par_iter()
            .map(|params| run_trial(adapter, params))
            .collect::<FitResult<_>>()?
    } else {
        samples
            .into_iter()
            .map(|params| run_trial(adapter, params))
            .collect::<FitResult<_>>()?
    };

    for (k, trial) in trials.iter().enumerate() {
        debug!(
            trial = k + 1,
            of = trials.len(),
            "{}",
            if trial.valid { "SUCCESS" } else { "FAILURE" }
        );
    }

    let assessment = Assessment {
        names: adapter.param_names(),
        bounds,
        trials,
    };
    info!(
        model = adapter.name(),
        trials = assessment.trials.len(),
        valid = assessment.valid_count(),
        "assessment finished"
    );
    Ok(assessment)
}

/// Write `assessment.csv`, `summary.csv`, `individual.svg` and `dependency.svg`.
pub fn write_report(run: &RunDirectory, assessment: &Assessment) -> FitResult<()> {
    let path = run.file("assessment.csv");
    let mut writer = csv::Writer::from_path(&path).map_err(|e| FitError::csv(&path, e))?;
    let mut header = assessment.names.clone();
    header.push("valid".into());
    writer.write_record(&header).map_err(|e| FitError::csv(&path, e))?;
    for trial in &assessment.trials {
        let mut record: Vec<String> = trial.params.iter().map(|p| p.to_string()).collect();
        record.push(u8::from(trial.valid).to_string());
        writer.write_record(&record).map_err(|e| FitError::csv(&path, e))?;
    }
    writer.flush().map_err(|e| FitError::io(&path, e))?;

    let path = run.file("summary.csv");
    let mut writer = csv::Writer::from_path(&path).map_err(|e| FitError::csv(&path, e))?;
    writer
        .write_record(["param", "bin_min", "bin_max", "trials", "valid", "fraction"])
        .map_err(|e| FitError::csv(&path, e))?;
    for bins in assessment.bins(SUMMARY_BINS) {
        for (k, fraction) in bins.fractions().into_iter().enumerate() {
            writer
                .write_record([
                    bins.name.clone(),
                    bins.edges[k].to_string(),
                    bins.edges[k + 1].to_string(),
                    bins.total[k].to_string(),
                    bins.valid[k].to_string(),
                    fraction.map(|f| format!("{f:.3}")).unwrap_or_default(),
                ])
                .map_err(|e| FitError::csv(&path, e))?;
        }
    }
    writer.flush().map_err(|e| FitError::io(&path, e))?;

    let samples: Vec<(Vec<f64>, bool)> = assessment
        .trials
        .iter()
        .map(|t| (t.params.clone(), t.valid))
        .collect();
    plot::plot_validity(&run.file("individual.svg"), &assessment.names, &samples)?;
    plot::plot_dependency(&run.file("dependency.svg"), &assessment.names, &samples)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::Arc;

    use super::*;
    use crate::core::Curve;

    fn adapter() -> ModelAdapter {
        let condition = Curve::condition(CurveType::Creep, 80.0, 800.0);
        ModelAdapter::from_name("evpwd_s", &BTreeMap::new(), Arc::new(vec![condition])).unwrap()
    }

    fn series(y: Vec<f64>, damage: Vec<f64>) -> SimSeries {
        SimSeries {
            x: (0..y.len()).map(|i| i as f64).collect(),
            y,
            damage,
        }
    }

    #[test]
    fn usable_runs_stay_in_the_unit_interval() {
        assert!(is_usable(&series(vec![0.0, 0.1, 0.3], vec![0.0, 0.2, 0.9]), CurveType::Creep, 3));
        assert!(!is_usable(&series(vec![0.0, 0.1, 0.3], vec![0.0, 0.2, 0.9]), CurveType::Creep, 4));
        assert!(!is_usable(&series(vec![0.0, 0.1, 1.3], vec![0.0, 0.2, 0.9]), CurveType::Creep, 3));
        assert!(!is_usable(&series(vec![0.0, 0.1, 0.3], vec![0.0, 0.2, 1.1]), CurveType::Creep, 3));
        // tensile curves carry stress on y
        assert!(is_usable(
            &SimSeries {
                x: vec![0.0, 0.01],
                y: vec![0.0, 250.0],
                damage: vec![0.0, 0.0],
            },
            CurveType::Tensile,
            2
        ));
    }

    #[test]
    fn trials_are_reproducible_for_a_seed() {
        let adapter = adapter();
        let settings = AssessSettings {
            trials: 4,
            seed: 11,
            parallel: true,
        };
        let a = assess(&adapter, &settings).unwrap();
        let b = assess(&adapter, &AssessSettings { parallel: false, ..settings }).unwrap();
        assert_eq!(a.trials, b.trials);
        for trial in &a.trials {
            for (value, &(min, max)) in trial.params.iter().zip(&a.bounds) {
                assert!(*value >= min && *value <= max);
            }
        }
    }

    #[test]
    fn bins_split_each_range() {
        let assessment = Assessment {
            names: vec!["a".into()],
            bounds: vec![(0.0, 10.0)],
            trials: vec![
                Trial { params: vec![0.5], valid: true },
                Trial { params: vec![0.7], valid: false },
                Trial { params: vec![10.0], valid: true },
            ],
        };
        let bins = &assessment.bins(10)[0];
        assert_eq!(bins.edges.len(), 11);
        assert_eq!(bins.total[0], 2);
        assert_eq!(bins.valid[0], 1);
        assert_eq!(bins.total[9], 1);
        let fractions = bins.fractions();
        assert_eq!(fractions[0], Some(0.5));
        assert_eq!(fractions[5], None);
    }

    #[test]
    fn report_files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunDirectory::at(dir.path().to_path_buf()).unwrap();
        let assessment = Assessment {
            names: vec!["wd_wc".into(), "wd_n".into()],
            bounds: vec![(0.0, 100.0); 2],
            trials: vec![
                Trial { params: vec![10.0, 20.0], valid: true },
                Trial { params: vec![60.0, 5.0], valid: false },
            ],
        };
        write_report(&run, &assessment).unwrap();

        let csv = fs::read_to_string(dir.path().join("assessment.csv")).unwrap();
        assert_eq!(csv.lines().next(), Some("wd_wc,wd_n,valid"));
        assert_eq!(csv.lines().nth(2), Some("60,5,0"));
        let summary = fs::read_to_string(dir.path().join("summary.csv")).unwrap();
        assert_eq!(summary.lines().count(), 1 + 2 * SUMMARY_BINS);
        assert!(dir.path().join("individual.svg").exists());
        assert!(dir.path().join("dependency.svg").exists());
    }
}
