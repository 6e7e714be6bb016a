//! The calibration workflow shared by the subcommands:
//! load curves -> build the problem -> pick a strategy -> search -> record.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::FitConfig;
use crate::core::Curve;
use crate::error::FitResult;
use crate::io::{self, ParamRecord, RunDirectory, ValidationRecord};
use crate::models::ModelAdapter;
use crate::optimization::{CalibrationRecorder, FitProblem, Problem, SolverResult, select_solver};
use crate::simulation::SimSettings;

/// Everything a finished calibration produced.
#[derive(Debug, Clone)]
pub struct CalibrationOutput {
    pub solver: String,
    pub description: String,
    pub result: SolverResult,
    pub record: ParamRecord,
    pub run: RunDirectory,
}

/// Build the global worker pool once. Later calls keep the first pool.
pub fn configure_threads(threads: usize) {
    let threads = if threads == 0 { num_cpus::get() } else { threads };
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
        Ok(()) => debug!(threads, "worker pool ready"),
        Err(e) => debug!(error = %e, "worker pool already configured"),
    }
}

/// Model adapter plus the configured error and constraint terms.
pub fn build_problem(config: &FitConfig, curves: Vec<Curve>) -> FitResult<FitProblem> {
    let adapter = ModelAdapter::from_name(&config.model.name, &config.model.fixed_params, Arc::new(curves))?
        .with_settings(config.sim_settings());

    let mut problem = FitProblem::new(adapter);
    if let Some(worst) = config.worst_fitness {
        problem = problem.with_worst_fitness(worst);
    }
    if let Some(initial) = &config.initial_params {
        problem = problem.with_initial_params(initial.clone())?;
    }
    for term in &config.errors {
        problem.add_error(&term.name, term.curve_type, term.weight)?;
    }
    for term in &config.constraints {
        problem.add_constraint(&term.name, term.curve_type, term.weight)?;
    }
    Ok(problem)
}

fn validation_record(problem: &FitProblem, params: &[f64]) -> FitResult<ValidationRecord> {
    let evaluation = problem.inspect(params)?;
    Ok(ValidationRecord {
        curves: problem
            .adapter()
            .exp_curves()
            .iter()
            .map(|c| c.test_id.clone())
            .collect(),
        fitness: evaluation.fitness,
        terms: evaluation.terms,
    })
}

/// Run a full calibration. Every setup error surfaces before the search
/// starts, including those of the validation set.
pub fn run_calibration(config: &FitConfig) -> FitResult<CalibrationOutput> {
    let train = io::read_curves(&config.train, &config.base_dir)?;
    info!(curves = train.len(), model = %config.model.name, "training curves loaded");
    let problem = build_problem(config, train)?;

    let validation = if config.validate.is_empty() {
        None
    } else {
        let curves = io::read_curves(&config.validate, &config.base_dir)?;
        info!(curves = curves.len(), "validation curves loaded");
        Some(build_problem(config, curves)?)
    };

    let kind = config.solver.kind()?;
    let settings = config.solver.settings(config.thread_count() != 1);
    let (mut solver, description) = select_solver(kind, &settings, problem.bounds());
    info!(solver = solver.name(), "{description}");

    let run = RunDirectory::create(&config.output_dir, config.title.as_deref())?;
    run.write_json("config.json", config)?;
    info!(path = %run.path().display(), "writing results");

    let mut recorder = CalibrationRecorder::new(&problem, settings.generations)
        .with_run_directory(run.clone())
        .with_intervals(config.recorder.interval, config.recorder.plot_interval)
        .with_max_evaluations(config.solver.max_evaluations);

    let result = solver.solve(&problem, &mut recorder)?;
    let validation = validation
        .map(|v| validation_record(&v, &result.params))
        .transpose()?;
    if let Some(v) = &validation {
        info!(fitness = v.fitness, "validation");
    }
    let record = recorder.finish(&result, validation)?;

    Ok(CalibrationOutput {
        solver: solver.name().to_string(),
        description,
        result,
        record,
        run,
    })
}

/// Run `model` once for `conditions` and write the curves to `output`.
///
/// Returns `None` when the run failed or produced too few samples; nothing
/// is written then.
pub fn run_simulation(
    model: &str,
    fixed: &BTreeMap<String, f64>,
    params: &[f64],
    conditions: Vec<Curve>,
    settings: SimSettings,
    output: &Path,
) -> FitResult<Option<Vec<Curve>>> {
    let adapter = ModelAdapter::from_name(model, fixed, Arc::new(conditions))?.with_settings(settings);
    let Some(curves) = adapter.evaluate(params)? else {
        return Ok(None);
    };
    io::output::write_curves_csv(output, &curves)?;
    Ok(Some(curves))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CurveType;

    #[test]
    fn simulation_writes_loadable_curves() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("sim.csv");
        let params = [
            0.671972514,
            25.74997349,
            43.16881374,
            4.487884698,
            1669.850786,
            8000.0,
            4.0,
            4.0,
        ];
        let curves = run_simulation(
            "evpcd",
            &BTreeMap::new(),
            &params,
            vec![Curve::condition(CurveType::Creep, 80.0, 800.0)],
            SimSettings::default(),
            &output,
        )
        .unwrap()
        .unwrap();
        let loaded = io::read_curve(&output).unwrap();
        assert_eq!(loaded.len(), curves[0].len());
        assert_eq!(loaded.stress, 80.0);
    }

    #[test]
    fn failed_simulation_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("sim.csv");
        let result = run_simulation(
            "evpwd_s",
            &BTreeMap::new(),
            &[50.0, 50.0],
            vec![Curve::condition(CurveType::Creep, 80.0, 800.0)],
            SimSettings {
                min_samples: usize::MAX,
                ..SimSettings::default()
            },
            &output,
        )
        .unwrap();
        assert!(result.is_none());
        assert!(!output.exists());
    }
}
