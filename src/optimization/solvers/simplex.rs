use std::cell::RefCell;

use argmin::core::{CostFunction, Error as ArgminError, Executor};
use argmin::solver::neldermead::NelderMead;
use tracing::debug;

use super::traits::{OptimizationCallback, Problem, Solver, SolverResult};
use super::{SearchSettings, clamp_to_bounds, finished};
use crate::error::{FitError, FitResult};

/// Local Nelder-Mead polish around the initial vector, driven by argmin
///
/// One "generation" is reported to the callback every n + 1 evaluations, the
/// cost of rebuilding a simplex.
pub struct NelderMeadOptimizer {
    settings: SearchSettings,
    /// Initial simplex edge as a fraction of each parameter range
    step: f64,
    sd_tolerance: f64,
}

impl NelderMeadOptimizer {
    pub fn new(settings: SearchSettings) -> Self {
        Self {
            settings,
            step: 0.1,
            sd_tolerance: 1e-10,
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    fn initial_simplex(&self, initial: &[f64], bounds: &[(f64, f64)]) -> Vec<Vec<f64>> {
        let mut start = initial.to_vec();
        clamp_to_bounds(&mut start, bounds);

        let mut simplex = vec![start.clone()];
        for (i, &(min, max)) in bounds.iter().enumerate() {
            let mut vertex = start.clone();
            let delta = self.step * (max - min);
            // Step inwards when the start sits on the upper bound
            vertex[i] = if vertex[i] + delta <= max { vertex[i] + delta } else { vertex[i] - delta };
            simplex.push(vertex);
        }
        simplex
    }
}

/// Progress shared between the argmin cost function and `solve`.
struct Tracker<'c> {
    callback: &'c mut dyn OptimizationCallback,
    per_iteration: usize,
    iterations: u32,
    cost_evals: usize,
    best_params: Vec<f64>,
    best_cost: f64,
    stop: Option<&'static str>,
    error: Option<FitError>,
}

struct Bridge<'a, 'c> {
    problem: &'a dyn Problem,
    precision: f64,
    tracker: &'a RefCell<Tracker<'c>>,
}

impl CostFunction for Bridge<'_, '_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, ArgminError> {
        let mut params = param.clone();
        clamp_to_bounds(&mut params, self.problem.bounds());

        let mut tracker = self.tracker.borrow_mut();
        let cost = match self.problem.cost(&params) {
            Ok(cost) => cost,
            Err(e) => {
                tracker.error = Some(e);
                return Err(ArgminError::msg("problem evaluation failed"));
            }
        };
        tracker.cost_evals += 1;
        if cost < tracker.best_cost {
            tracker.best_cost = cost;
            tracker.best_params = params;
        }

        if tracker.cost_evals % tracker.per_iteration == 0 {
            tracker.iterations += 1;
            let Tracker {
                callback,
                iterations,
                best_params,
                best_cost,
                ..
            } = &mut *tracker;
            if let Err(e) = callback.on_iteration(*iterations, best_params, *best_cost) {
                tracker.error = Some(e);
                return Err(ArgminError::msg("progress callback failed"));
            }
            if tracker.callback.should_stop() {
                tracker.stop = Some("Stopped by callback");
            } else if tracker.best_cost < self.precision {
                tracker.stop = Some("Converged");
            }
            if tracker.stop.is_some() {
                return Err(ArgminError::msg("search stopped"));
            }
        }
        Ok(cost)
    }
}

impl Solver for NelderMeadOptimizer {
    fn name(&self) -> &str {
        "Nelder-Mead"
    }

    fn solve(
        &mut self,
        problem: &dyn Problem,
        callback: &mut dyn OptimizationCallback,
    ) -> FitResult<SolverResult> {
        let bounds = problem.bounds();
        let simplex = self.initial_simplex(problem.initial_params(), bounds);
        let per_iteration = simplex.len().max(1);

        let tracker = RefCell::new(Tracker {
            callback,
            per_iteration,
            iterations: 0,
            cost_evals: 0,
            best_params: simplex[0].clone(),
            best_cost: f64::INFINITY,
            stop: None,
            error: None,
        });
        let bridge = Bridge {
            problem,
            precision: self.settings.precision,
            tracker: &tracker,
        };

        let solver = NelderMead::new(simplex)
            .with_sd_tolerance(self.sd_tolerance)
            .map_err(|e| FitError::Search(e.to_string()))?;
        // Evaluation budget expressed in simplex iterations
        let max_iters = u64::from(self.settings.generations) * per_iteration as u64;
        // The executor result owns the bridge; keep only its status so the
        // tracker can be unwrapped.
        let outcome = Executor::new(bridge, solver)
            .configure(|state| state.max_iters(max_iters))
            .run()
            .map(|_| ())
            .map_err(|e| e.to_string());

        let Tracker {
            iterations,
            cost_evals,
            best_params,
            best_cost,
            stop,
            error,
            ..
        } = tracker.into_inner();

        if let Some(e) = error {
            return Err(e);
        }
        if let Some(message) = stop {
            return Ok(finished(true, message, iterations, best_params, best_cost, cost_evals, problem));
        }
        match outcome {
            Ok(_) => {
                debug!(iterations, best_cost, "simplex converged");
                Ok(finished(true, "Converged", iterations, best_params, best_cost, cost_evals, problem))
            }
            Err(e) => Err(FitError::Search(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    #[test]
    fn polishes_to_the_minimum() {
        let problem = Quadratic::new(vec![0.3, 0.6], vec![(0.0, 1.0); 2]);
        let mut solver = NelderMeadOptimizer::new(settings(0));
        let result = solver.solve(&problem, &mut Budget::new(10_000)).unwrap();
        assert!(result.cost < 1e-8, "cost {}", result.cost);
        assert!(problem.all_in_bounds());
    }

    #[test]
    fn callback_stop_keeps_best_so_far() {
        let problem = Quadratic::new(vec![0.9, 0.9], vec![(0.0, 1.0); 2]);
        let mut solver = NelderMeadOptimizer::new(settings(0));
        let mut budget = Budget::new(3);
        let result = solver.solve(&problem, &mut budget).unwrap();
        assert_eq!(result.message, "Stopped by callback");
        assert_eq!(result.iterations, 3);
        assert_eq!(result.cost_evals, 9);
        assert_eq!(budget.costs.last().copied(), Some(result.cost));
    }

    #[test]
    fn minimum_outside_the_box_lands_on_the_bound() {
        let problem = Quadratic::new(vec![2.0], vec![(0.0, 1.0)]);
        let mut solver = NelderMeadOptimizer::new(settings(0));
        let result = solver.solve(&problem, &mut Budget::new(1_000)).unwrap();
        assert!((result.params[0] - 1.0).abs() < 1e-6);
        assert!(problem.all_in_bounds());
    }
}
