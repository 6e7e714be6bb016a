use rand::Rng;
use rand::rngs::StdRng;
use tracing::debug;

use super::traits::{OptimizationCallback, Problem, Solver, SolverResult};
use super::{SearchSettings, Stagnation, clamp_to_bounds, evaluate_batch, finished};
use crate::error::FitResult;

/// Distribution index of simulated binary crossover
const ETA_CROSSOVER: f64 = 20.0;
/// Distribution index of polynomial mutation
const ETA_MUTATION: f64 = 20.0;

/// Generational (μ + λ) evolutionary search
///
/// Each generation breeds `offspring` children from binary-tournament parents
/// (SBX crossover with probability `crossover`, polynomial mutation with
/// probability `mutation`), then keeps the best `population` of parents and
/// children together.
pub struct GeneticOptimizer {
    settings: SearchSettings,
}

impl GeneticOptimizer {
    pub fn new(settings: SearchSettings) -> Self {
        Self { settings }
    }

    fn initialize_population(
        &self,
        rng: &mut StdRng,
        bounds: &[(f64, f64)],
        initial_params: &[f64],
    ) -> Vec<Vec<f64>> {
        let size = self.settings.population.max(2);
        let mut population = Vec::with_capacity(size);

        let mut first = initial_params.to_vec();
        clamp_to_bounds(&mut first, bounds);
        population.push(first);

        for _ in 1..size {
            population.push(
                bounds
                    .iter()
                    .map(|&(min, max)| if max > min { rng.gen_range(min..=max) } else { min })
                    .collect(),
            );
        }
        population
    }

    fn tournament<'p>(rng: &mut StdRng, population: &'p [Vec<f64>], costs: &[f64]) -> &'p [f64] {
        let a = rng.gen_range(0..population.len());
        let b = rng.gen_range(0..population.len());
        if costs[a] <= costs[b] { &population[a] } else { &population[b] }
    }

    fn crossover(rng: &mut StdRng, p1: &[f64], p2: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut c1 = p1.to_vec();
        let mut c2 = p2.to_vec();
        for i in 0..p1.len() {
            if rng.gen_bool(0.5) {
                continue;
            }
            let u: f64 = rng.gen_range(0.0..1.0);
            let beta = if u <= 0.5 {
                (2.0 * u).powf(1.0 / (ETA_CROSSOVER + 1.0))
            } else {
                (1.0 / (2.0 * (1.0 - u))).powf(1.0 / (ETA_CROSSOVER + 1.0))
            };
            c1[i] = 0.5 * ((1.0 + beta) * p1[i] + (1.0 - beta) * p2[i]);
            c2[i] = 0.5 * ((1.0 - beta) * p1[i] + (1.0 + beta) * p2[i]);
        }
        (c1, c2)
    }

    fn mutate(rng: &mut StdRng, child: &mut [f64], bounds: &[(f64, f64)]) {
        let gene_rate = 1.0 / child.len().max(1) as f64;
        for (value, &(min, max)) in child.iter_mut().zip(bounds) {
            if rng.gen_range(0.0..1.0) >= gene_rate {
                continue;
            }
            let u: f64 = rng.gen_range(0.0..1.0);
            let delta = if u < 0.5 {
                (2.0 * u).powf(1.0 / (ETA_MUTATION + 1.0)) - 1.0
            } else {
                1.0 - (2.0 * (1.0 - u)).powf(1.0 / (ETA_MUTATION + 1.0))
            };
            *value += delta * (max - min);
        }
    }

    fn breed(
        &self,
        rng: &mut StdRng,
        population: &[Vec<f64>],
        costs: &[f64],
        bounds: &[(f64, f64)],
    ) -> Vec<Vec<f64>> {
        let count = self.settings.offspring.max(1);
        let mut children = Vec::with_capacity(count + 1);
        while children.len() < count {
            let p1 = Self::tournament(rng, population, costs);
            let p2 = Self::tournament(rng, population, costs);
            let (c1, c2) = if rng.gen_bool(self.settings.crossover.clamp(0.0, 1.0)) {
                Self::crossover(rng, p1, p2)
            } else {
                (p1.to_vec(), p2.to_vec())
            };
            for mut child in [c1, c2] {
                if rng.gen_bool(self.settings.mutation.clamp(0.0, 1.0)) {
                    Self::mutate(rng, &mut child, bounds);
                }
                clamp_to_bounds(&mut child, bounds);
                children.push(child);
            }
        }
        children.truncate(count);
        children
    }
}

impl Solver for GeneticOptimizer {
    fn name(&self) -> &str {
        "GA"
    }

    fn solve(
        &mut self,
        problem: &dyn Problem,
        callback: &mut dyn OptimizationCallback,
    ) -> FitResult<SolverResult> {
        let bounds = problem.bounds();
        let mut rng = self.settings.rng();
        let parallel = self.settings.parallel;

        let mut population = self.initialize_population(&mut rng, bounds, problem.initial_params());
        let mut costs = evaluate_batch(problem, &population, parallel)?;
        let mut cost_evals = population.len();
        let mut stagnation = Stagnation::default();
        let keep = population.len();

        for generation in 0..self.settings.generations {
            let children = self.breed(&mut rng, &population, &costs, bounds);
            let child_costs = evaluate_batch(problem, &children, parallel)?;
            cost_evals += children.len();

            // (μ + λ) survivor selection
            population.extend(children);
            costs.extend(child_costs);
            let mut order: Vec<usize> = (0..population.len()).collect();
            order.sort_by(|&a, &b| costs[a].total_cmp(&costs[b]));
            order.truncate(keep);
            population = order.iter().map(|&i| population[i].clone()).collect();
            costs = order.iter().map(|&i| costs[i]).collect();

            let best_cost = costs[0];
            debug!(generation = generation + 1, best_cost, "GA generation");
            callback.on_iteration(generation + 1, &population[0], best_cost)?;

            if callback.should_stop() {
                return Ok(finished(
                    true,
                    "Stopped by callback",
                    generation + 1,
                    population.swap_remove(0),
                    best_cost,
                    cost_evals,
                    problem,
                ));
            }
            if best_cost < self.settings.precision {
                return Ok(finished(
                    true,
                    "Converged",
                    generation + 1,
                    population.swap_remove(0),
                    best_cost,
                    cost_evals,
                    problem,
                ));
            }
            if stagnation.update(best_cost, self.settings.stagnation) {
                return Ok(finished(
                    false,
                    "Stagnated",
                    generation + 1,
                    population.swap_remove(0),
                    best_cost,
                    cost_evals,
                    problem,
                ));
            }
        }

        let best_cost = costs.first().copied().unwrap_or(f64::INFINITY);
        let best = population.swap_remove(0);
        Ok(finished(
            false,
            "Max iterations reached",
            self.settings.generations,
            best,
            best_cost,
            cost_evals,
            problem,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    #[test]
    fn converges_on_quadratic_within_bounds() {
        let problem = Quadratic::new(vec![1.0, -2.0, 3.0], vec![(-5.0, 5.0); 3]);
        let mut solver = GeneticOptimizer::new(settings(7));
        let mut budget = Budget::new(150);
        let result = solver.solve(&problem, &mut budget).unwrap();

        assert!(result.cost < 5e-2, "cost {}", result.cost);
        assert!(problem.all_in_bounds());
        assert_eq!(result.cost_evals, problem.seen.lock().unwrap().len());
    }

    #[test]
    fn best_cost_never_gets_worse() {
        let problem = Quadratic::new(vec![0.3, 0.7], vec![(0.0, 1.0); 2]);
        let mut solver = GeneticOptimizer::new(settings(11));
        let mut budget = Budget::new(20);
        solver.solve(&problem, &mut budget).unwrap();
        assert!(budget.costs.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn same_seed_same_result() {
        let run = |seed| {
            let problem = Quadratic::new(vec![1.0, 2.0], vec![(0.0, 4.0); 2]);
            let mut solver = GeneticOptimizer::new(SearchSettings {
                parallel: true,
                ..settings(seed)
            });
            solver.solve(&problem, &mut Budget::new(10)).unwrap()
        };
        let (a, b) = (run(3), run(3));
        assert_eq!(a.params, b.params);
        assert_eq!(a.cost, b.cost);
    }

    #[test]
    fn stops_at_target_fitness() {
        let problem = Quadratic::new(vec![0.5], vec![(0.0, 1.0)]);
        let mut solver = GeneticOptimizer::new(SearchSettings {
            precision: 1e-3,
            ..settings(5)
        });
        let result = solver.solve(&problem, &mut Budget::new(1_000)).unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Converged");
    }
}
