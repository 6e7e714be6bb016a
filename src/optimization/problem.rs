use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tracing::debug;

use crate::core::{
    Constraint, ConstraintKind, Curve, CurveType, ErrorKind, ErrorMetric, bounds_of, validate_params,
};
use crate::error::{FitError, FitResult};
use crate::models::ModelAdapter;
use crate::optimization::solvers::traits::Problem;

/// One weighted contribution to the fitness.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Term {
    pub name: String,
    #[serde(rename = "type")]
    pub curve_type: CurveType,
    pub weight: f64,
    pub value: f64,
}

/// Full breakdown of one parameter vector.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub fitness: f64,
    /// `None` when the model run came back EMPTY.
    pub predictions: Option<Vec<Curve>>,
    pub terms: Vec<Term>,
}

impl Evaluation {
    pub fn is_empty(&self) -> bool {
        self.predictions.is_none()
    }
}

struct Weighted<T: ?Sized> {
    weight: f64,
    inner: Box<T>,
}

/// Calibration problem: model adapter plus the error and constraint terms that
/// turn its predictions into a single fitness (lower is better).
pub struct FitProblem {
    adapter: ModelAdapter,
    errors: Vec<Weighted<dyn ErrorMetric>>,
    constraints: Vec<Weighted<dyn Constraint>>,
    worst_fitness: f64,
    initial: Vec<f64>,
    bounds: Vec<(f64, f64)>,
    names: Vec<String>,
    evaluations: AtomicUsize,
    failures: AtomicUsize,
}

impl FitProblem {
    /// Starts at the midpoint of every parameter range.
    pub fn new(adapter: ModelAdapter) -> Self {
        let info = adapter.param_info();
        let initial = info.iter().map(|p| p.midpoint()).collect();
        let bounds = bounds_of(info);
        let names = adapter.param_names();
        Self {
            adapter,
            errors: Vec::new(),
            constraints: Vec::new(),
            worst_fitness: f64::MAX,
            initial,
            bounds,
            names,
            evaluations: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    /// Fitness reported for EMPTY predictions and non-finite scores.
    pub fn with_worst_fitness(mut self, worst: f64) -> Self {
        self.worst_fitness = worst;
        self
    }

    pub fn with_initial_params(mut self, initial: Vec<f64>) -> FitResult<Self> {
        validate_params(self.adapter.param_info(), &initial)?;
        for (value, info) in initial.iter().zip(self.adapter.param_info()) {
            if !info.contains(*value) {
                return Err(FitError::Config(format!(
                    "initial value {value} of '{}' is outside [{}, {}]",
                    info.name, info.min, info.max
                )));
            }
        }
        self.initial = initial;
        Ok(self)
    }

    /// Register an error metric by name. Its reference values are computed here.
    pub fn add_error(&mut self, name: &str, curve_type: CurveType, weight: f64) -> FitResult<()> {
        let mut metric = ErrorKind::from_name(name)?.build(curve_type, self.adapter.exp_curves().clone());
        metric.prepare()?;
        self.errors.push(Weighted {
            weight,
            inner: metric,
        });
        Ok(())
    }

    pub fn add_constraint(&mut self, name: &str, curve_type: CurveType, weight: f64) -> FitResult<()> {
        let constraint =
            ConstraintKind::from_name(name)?.build(curve_type, self.adapter.exp_curves().clone());
        self.constraints.push(Weighted {
            weight,
            inner: constraint,
        });
        Ok(())
    }

    pub fn adapter(&self) -> &ModelAdapter {
        &self.adapter
    }

    pub fn worst_fitness(&self) -> f64 {
        self.worst_fitness
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    /// Score `params` and count the evaluation.
    pub fn evaluate(&self, params: &[f64]) -> FitResult<Evaluation> {
        let evaluation = self.inspect(params)?;
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        if evaluation.is_empty() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        Ok(evaluation)
    }

    /// Score `params` without touching the counters (used for reporting).
    pub fn inspect(&self, params: &[f64]) -> FitResult<Evaluation> {
        let Some(predictions) = self.adapter.evaluate(params)? else {
            return Ok(Evaluation {
                fitness: self.worst_fitness,
                predictions: None,
                terms: Vec::new(),
            });
        };

        let terms: Vec<Term> = self
            .errors
            .iter()
            .map(|e| Term {
                name: e.inner.name().to_string(),
                curve_type: e.inner.curve_type(),
                weight: e.weight,
                value: e.inner.value(&predictions),
            })
            .chain(self.constraints.iter().map(|c| Term {
                name: c.inner.name().to_string(),
                curve_type: c.inner.curve_type(),
                weight: c.weight,
                value: c.inner.value(&predictions),
            }))
            .collect();

        let fitness: f64 = terms.iter().map(|t| t.weight * t.value).sum();
        let fitness = if fitness.is_finite() {
            fitness
        } else {
            debug!(fitness, "non-finite fitness replaced by the worst value");
            self.worst_fitness
        };

        Ok(Evaluation {
            fitness,
            predictions: Some(predictions),
            terms,
        })
    }

    pub fn fitness(&self, params: &[f64]) -> FitResult<f64> {
        Ok(self.evaluate(params)?.fitness)
    }
}

impl Problem for FitProblem {
    fn cost(&self, params: &[f64]) -> FitResult<f64> {
        self.fitness(params)
    }

    fn num_params(&self) -> usize {
        self.bounds.len()
    }

    fn initial_params(&self) -> &[f64] {
        &self.initial
    }

    fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }

    fn param_names(&self) -> &[String] {
        &self.names
    }

    fn failed_evaluations(&self) -> usize {
        self.failures()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::simulation::SimSettings;

    const TRUE_PARAMS: [f64; 8] = [
        0.671972514,
        25.74997349,
        43.16881374,
        4.487884698,
        1669.850786,
        8000.0,
        4.0,
        4.0,
    ];

    fn synthetic_problem() -> FitProblem {
        let conditions = vec![
            Curve::condition(CurveType::Creep, 70.0, 800.0),
            Curve::condition(CurveType::Creep, 80.0, 800.0),
        ];
        let generator =
            ModelAdapter::from_name("evpcd", &BTreeMap::new(), Arc::new(conditions.clone())).unwrap();
        let exp = generator.predict(&TRUE_PARAMS, &conditions).unwrap().unwrap();
        let adapter = ModelAdapter::from_name("evpcd", &BTreeMap::new(), Arc::new(exp)).unwrap();

        let mut problem = FitProblem::new(adapter);
        for name in ["y_end", "x_end", "y_area", "dy_area"] {
            problem.add_error(name, CurveType::Creep, 1.0).unwrap();
        }
        problem
    }

    #[test]
    fn generating_parameters_score_zero() {
        let problem = synthetic_problem();
        let evaluation = problem.evaluate(&TRUE_PARAMS).unwrap();
        assert!(evaluation.fitness.abs() < 1e-9, "fitness {}", evaluation.fitness);
        assert_eq!(evaluation.terms.len(), 4);
        assert_eq!(problem.evaluations(), 1);
        assert_eq!(problem.failures(), 0);
    }

    #[test]
    fn other_parameters_score_worse() {
        let problem = synthetic_problem();
        let mut params = TRUE_PARAMS;
        params[5] = 12_000.0;
        let fitness = problem.fitness(&params).unwrap();
        assert!(fitness > 1e-3);
    }

    #[test]
    fn empty_prediction_is_the_worst_fitness() {
        let exp = vec![
            Curve::new(vec![0.0, 10.0], vec![0.0, 0.02], CurveType::Creep, 80.0, 800.0, "G1").unwrap(),
        ];
        let adapter = ModelAdapter::from_name("evpcd", &BTreeMap::new(), Arc::new(exp))
            .unwrap()
            .with_settings(SimSettings {
                min_samples: usize::MAX,
                ..SimSettings::default()
            });
        let mut problem = FitProblem::new(adapter).with_worst_fitness(1.0e6);
        problem.add_error("y_end", CurveType::Creep, 1.0).unwrap();
        problem.add_constraint("inc_y_end", CurveType::Creep, 1.0).unwrap();

        assert_eq!(problem.cost(&TRUE_PARAMS).unwrap(), 1.0e6);
        assert_eq!(problem.failed_evaluations(), 1);

        // reporting does not count
        assert!(problem.inspect(&TRUE_PARAMS).unwrap().is_empty());
        assert_eq!(problem.evaluations(), 1);
    }

    #[test]
    fn setup_errors_surface_immediately() {
        let exp = vec![
            Curve::new(vec![0.0, 10.0], vec![0.0, 0.0], CurveType::Creep, 80.0, 800.0, "flat").unwrap(),
        ];
        let adapter = ModelAdapter::from_name("evpcd", &BTreeMap::new(), Arc::new(exp)).unwrap();
        let mut problem = FitProblem::new(adapter);
        assert!(matches!(
            problem.add_error("y_end", CurveType::Creep, 1.0),
            Err(FitError::DivisionByZero { .. })
        ));
        assert!(matches!(
            problem.add_error("y_max", CurveType::Creep, 1.0),
            Err(FitError::UnknownError(_))
        ));
        assert!(matches!(
            problem.add_constraint("inc_area", CurveType::Creep, 1.0),
            Err(FitError::UnknownConstraint(_))
        ));
        assert!(matches!(problem.cost(&[1.0; 3]), Err(FitError::ParamCount { .. })));
    }

    #[test]
    fn initial_params_must_fit_the_bounds() {
        let adapter = ModelAdapter::from_name("evpwd_s", &BTreeMap::new(), Arc::new(Vec::new())).unwrap();
        let problem = FitProblem::new(adapter);
        assert_eq!(problem.initial_params(), &[50.0, 50.0]);
        assert!(matches!(problem.with_initial_params(vec![150.0, 1.0]), Err(FitError::Config(_))));
    }
}
