use rand_distr::{Distribution, StandardNormal};
use tracing::debug;

use super::traits::{OptimizationCallback, Problem, Solver, SolverResult};
use super::{SearchSettings, Stagnation, clamp_to_bounds, evaluate_batch, finished};
use crate::error::FitResult;

/// Diagonal-covariance CMA-ES
///
/// Works in coordinates normalized to the unit box, so one step size covers
/// parameters whose ranges differ by orders of magnitude.
pub struct CMAESOptimizer {
    settings: SearchSettings,
    population_size: usize,
    sigma: f64,
}

impl CMAESOptimizer {
    pub fn new(settings: SearchSettings) -> Self {
        Self {
            settings,
            population_size: 0,
            sigma: 0.3,
        }
    }

    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self
    }

    /// Initial step size as a fraction of each parameter range
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }
}

fn to_unit(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params
        .iter()
        .zip(bounds)
        .map(|(&p, &(min, max))| if max > min { (p - min) / (max - min) } else { 0.0 })
        .collect()
}

fn from_unit(unit: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    let mut params: Vec<f64> = unit
        .iter()
        .zip(bounds)
        .map(|(&u, &(min, max))| min + u * (max - min))
        .collect();
    clamp_to_bounds(&mut params, bounds);
    params
}

impl Solver for CMAESOptimizer {
    fn name(&self) -> &str {
        "CMA-ES"
    }

    fn solve(
        &mut self,
        problem: &dyn Problem,
        callback: &mut dyn OptimizationCallback,
    ) -> FitResult<SolverResult> {
        let n = problem.num_params();
        let nf = n as f64;
        let bounds = problem.bounds();
        let mut rng = self.settings.rng();

        // Set population size if not specified
        if self.population_size == 0 {
            self.population_size = 4 + (3.0 * nf.ln()).floor() as usize;
        }
        let lambda = self.population_size.max(2);
        let mu = (lambda / 2).max(1);

        // Recombination weights
        let mut weights: Vec<f64> = (0..mu)
            .map(|i| ((mu as f64 + 0.5).ln() - (i as f64 + 1.0).ln()).max(0.0))
            .collect();
        let sum_weights: f64 = weights.iter().sum();
        for w in weights.iter_mut() {
            *w /= sum_weights;
        }
        let mu_eff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();

        // Strategy parameters (separable variant: learning rates scaled by (n + 2) / 3)
        let cc = 4.0 / (nf + 4.0);
        let cs = (mu_eff + 2.0) / (nf + mu_eff + 5.0);
        let c1 = (nf + 2.0) / 3.0 * 2.0 / ((nf + 1.3).powi(2) + mu_eff);
        let cmu = ((nf + 2.0) / 3.0 * 2.0 * (mu_eff - 2.0 + 1.0 / mu_eff)
            / ((nf + 2.0).powi(2) + mu_eff))
            .min(1.0 - c1);
        let damps = 1.0 + 2.0 * (((mu_eff - 1.0) / (nf + 1.0)).sqrt() - 1.0).max(0.0) + cs;
        let expected_norm = nf.sqrt() * (1.0 - 1.0 / (4.0 * nf) + 1.0 / (21.0 * nf * nf));

        let mut mean = to_unit(problem.initial_params(), bounds);
        let mut cov = vec![1.0_f64; n];
        let mut sigma = self.sigma;
        let mut ps = vec![0.0_f64; n];
        let mut pc = vec![0.0_f64; n];

        let mut cost_evals = 0;
        let mut best_cost = f64::INFINITY;
        let mut best_params = from_unit(&mean, bounds);
        let mut stagnation = Stagnation::default();

        for iter in 0..self.settings.generations {
            // Sample on the driver thread, score in parallel
            let steps: Vec<Vec<f64>> = (0..lambda)
                .map(|_| {
                    (0..n)
                        .map(|i| {
                            let z: f64 = StandardNormal.sample(&mut rng);
                            cov[i].sqrt() * z
                        })
                        .collect()
                })
                .collect();
            let population: Vec<Vec<f64>> = steps
                .iter()
                .map(|y| {
                    let unit: Vec<f64> = mean.iter().zip(y).map(|(m, yi)| m + sigma * yi).collect();
                    from_unit(&unit, bounds)
                })
                .collect();
            let costs = evaluate_batch(problem, &population, self.settings.parallel)?;
            cost_evals += costs.len();

            let mut order: Vec<usize> = (0..lambda).collect();
            order.sort_by(|&a, &b| costs[a].total_cmp(&costs[b]));
            if costs[order[0]] < best_cost {
                best_cost = costs[order[0]];
                best_params = population[order[0]].clone();
            }

            debug!(generation = iter + 1, best_cost, sigma, "CMA-ES generation");
            callback.on_iteration(iter + 1, &best_params, best_cost)?;

            if callback.should_stop() {
                return Ok(finished(
                    true,
                    "Stopped by callback",
                    iter + 1,
                    best_params,
                    best_cost,
                    cost_evals,
                    problem,
                ));
            }
            if best_cost < self.settings.precision {
                return Ok(finished(
                    true,
                    "Converged",
                    iter + 1,
                    best_params,
                    best_cost,
                    cost_evals,
                    problem,
                ));
            }
            if stagnation.update(best_cost, self.settings.stagnation) {
                return Ok(finished(
                    false,
                    "Stagnated",
                    iter + 1,
                    best_params,
                    best_cost,
                    cost_evals,
                    problem,
                ));
            }

            // Recombination in step space. Steps are taken from the clamped
            // points so the update follows what was actually evaluated.
            let selected: Vec<Vec<f64>> = order[..mu]
                .iter()
                .map(|&k| {
                    to_unit(&population[k], bounds)
                        .iter()
                        .zip(&mean)
                        .map(|(x, m)| (x - m) / sigma)
                        .collect()
                })
                .collect();
            let mut y_w = vec![0.0_f64; n];
            for (w, y) in weights.iter().zip(&selected) {
                for i in 0..n {
                    y_w[i] += w * y[i];
                }
            }
            for i in 0..n {
                mean[i] += sigma * y_w[i];
            }

            // Evolution paths
            for i in 0..n {
                ps[i] = (1.0 - cs) * ps[i]
                    + (cs * (2.0 - cs) * mu_eff).sqrt() * y_w[i] / cov[i].sqrt();
            }
            let ps_norm = ps.iter().map(|x| x * x).sum::<f64>().sqrt();
            let h_sigma = if ps_norm / (1.0 - (1.0 - cs).powi(2 * (iter as i32 + 1))).sqrt()
                < (1.4 + 2.0 / (nf + 1.0)) * expected_norm
            {
                1.0
            } else {
                0.0
            };
            for i in 0..n {
                pc[i] = (1.0 - cc) * pc[i] + h_sigma * (cc * (2.0 - cc) * mu_eff).sqrt() * y_w[i];
            }

            // Diagonal covariance: rank-one plus rank-mu
            for i in 0..n {
                let rank_mu: f64 = weights.iter().zip(&selected).map(|(w, y)| w * y[i] * y[i]).sum();
                cov[i] = (1.0 - c1 - cmu) * cov[i]
                    + c1 * (pc[i] * pc[i] + (1.0 - h_sigma) * cc * (2.0 - cc) * cov[i])
                    + cmu * rank_mu;
                cov[i] = cov[i].max(1e-20);
            }

            sigma *= ((cs / damps) * (ps_norm / expected_norm - 1.0)).exp();
            sigma = sigma.clamp(1e-12, 1.0);
        }

        Ok(finished(
            false,
            "Max iterations reached",
            self.settings.generations,
            best_params,
            best_cost,
            cost_evals,
            problem,
        ))
    }
}
