use tracing::{debug, info, warn};

use super::problem::FitProblem;
use super::solvers::traits::{OptimizationCallback, SolverResult};
use crate::core::{Curve, CurveType};
use crate::error::FitResult;
use crate::io::output::{self, HistoryRow, NamedValue, ParamRecord, RunDirectory, ValidationRecord};
use crate::io::plot;

/// Tracks the best-so-far vector and periodically writes it to a run
/// directory: `params.json`, `history.csv`, `predictions.csv` and one
/// `curves_<type>.svg` per curve type.
///
/// Without a run directory it only keeps the history and enforces budgets.
pub struct CalibrationRecorder<'a> {
    problem: &'a FitProblem,
    run: Option<RunDirectory>,
    interval: u32,
    plot_interval: u32,
    max_iterations: u32,
    max_evaluations: Option<usize>,
    iteration: u32,
    history: Vec<HistoryRow>,
}

impl<'a> CalibrationRecorder<'a> {
    pub fn new(problem: &'a FitProblem, max_iterations: u32) -> Self {
        Self {
            problem,
            run: None,
            interval: 10,
            plot_interval: 10,
            max_iterations,
            max_evaluations: None,
            iteration: 0,
            history: Vec::new(),
        }
    }

    pub fn with_run_directory(mut self, run: RunDirectory) -> Self {
        self.run = Some(run);
        self
    }

    /// Snapshot every `interval` iterations and plot every `plot_interval`;
    /// zero disables either.
    pub fn with_intervals(mut self, interval: u32, plot_interval: u32) -> Self {
        self.interval = interval;
        self.plot_interval = plot_interval;
        self
    }

    pub fn with_max_evaluations(mut self, max_evaluations: Option<usize>) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    pub fn history(&self) -> &[HistoryRow] {
        &self.history
    }

    pub fn run_directory(&self) -> Option<&RunDirectory> {
        self.run.as_ref()
    }

    /// Write the final snapshot, plots included, and return its record.
    ///
    /// Unlike periodic snapshots, failures here are returned to the caller.
    pub fn finish(
        &mut self,
        result: &SolverResult,
        validation: Option<ValidationRecord>,
    ) -> FitResult<ParamRecord> {
        let (mut record, predictions) = self.record(result.iterations, &result.params)?;
        record.validation = validation;
        info!(
            fitness = record.fitness,
            iterations = result.iterations,
            evaluations = record.evaluations,
            failed = record.failed_evaluations,
            "{}",
            result.message
        );
        self.write(&record, predictions.as_deref(), true)?;
        Ok(record)
    }

    /// Score `params` once; the predictions come back alongside the record
    /// for the plots.
    fn record(&self, iteration: u32, params: &[f64]) -> FitResult<(ParamRecord, Option<Vec<Curve>>)> {
        let evaluation = self.problem.inspect(params)?;
        let record = ParamRecord {
            model: self.problem.adapter().name().to_string(),
            iteration,
            evaluations: self.problem.evaluations(),
            failed_evaluations: self.problem.failures(),
            fitness: evaluation.fitness,
            params: NamedValue::zip(&self.problem.adapter().param_names(), params),
            terms: evaluation.terms,
            validation: None,
        };
        Ok((record, evaluation.predictions))
    }

    fn write(&self, record: &ParamRecord, predictions: Option<&[Curve]>, plots: bool) -> FitResult<()> {
        let Some(run) = &self.run else {
            return Ok(());
        };
        run.write_json("params.json", record)?;
        output::write_history(
            &run.file("history.csv"),
            &self.problem.adapter().param_names(),
            &self.history,
        )?;
        if !plots {
            return Ok(());
        }

        if let Some(curves) = predictions {
            output::write_curves_csv(&run.file("predictions.csv"), curves)?;
        }
        let experimental = self.problem.adapter().exp_curves();
        for curve_type in [CurveType::Creep, CurveType::Tensile] {
            plot::plot_curves(
                &run.file(&format!("curves_{curve_type}.svg")),
                curve_type,
                experimental,
                predictions,
            )?;
        }
        Ok(())
    }

    fn snapshot(&self, iteration: u32, params: &[f64]) -> FitResult<()> {
        let plots = self.plot_interval > 0 && iteration % self.plot_interval == 0;
        let (record, predictions) = self.record(iteration, params)?;
        self.write(&record, predictions.as_deref(), plots)
    }
}

impl OptimizationCallback for CalibrationRecorder<'_> {
    fn on_iteration(&mut self, iteration: u32, params: &[f64], cost: f64) -> FitResult<()> {
        self.iteration = iteration;
        self.history.push(HistoryRow {
            iteration,
            evaluations: self.problem.evaluations(),
            fitness: cost,
            params: params.to_vec(),
        });
        debug!(iteration, cost, "best so far");

        if self.interval > 0 && iteration % self.interval == 0 {
            info!(
                iteration,
                fitness = cost,
                evaluations = self.problem.evaluations(),
                failed = self.problem.failures(),
                "progress"
            );
            if let Err(e) = self.snapshot(iteration, params) {
                warn!(iteration, error = %e, "could not write snapshot");
            }
        }
        Ok(())
    }

    fn should_stop(&self) -> bool {
        self.iteration >= self.max_iterations
            || self
                .max_evaluations
                .is_some_and(|limit| self.problem.evaluations() >= limit)
    }
}
