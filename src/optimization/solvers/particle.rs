use rand::Rng;
use rand::rngs::StdRng;
use tracing::debug;

use super::traits::{OptimizationCallback, Problem, Solver, SolverResult};
use super::{SearchSettings, Stagnation, clamp_to_bounds, evaluate_batch, finished};
use crate::error::FitResult;

/// Particle Swarm Optimization
///
/// Robust on the noisy, plateau-ridden fitness surfaces that failed model runs
/// produce, with a modest number of evaluations per generation.
pub struct ParticleOptimizer {
    settings: SearchSettings,
    population_size: usize,
    /// Velocity carried over between generations
    inertia: f64,
    /// Pull towards each particle's own best position
    cognitive: f64,
    /// Pull towards the swarm's best position
    social: f64,
}

impl ParticleOptimizer {
    pub fn new(settings: SearchSettings) -> Self {
        Self {
            settings,
            population_size: 20,
            inertia: 0.7,
            cognitive: 1.5,
            social: 1.5,
        }
    }

    /// Swarm size, at least two particles
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size.max(2);
        self
    }

    /// Override the update weights (0.7, 1.5, 1.5 unless set)
    pub fn with_pso_params(mut self, inertia: f64, cognitive: f64, social: f64) -> Self {
        self.inertia = inertia;
        self.cognitive = cognitive;
        self.social = social;
        self
    }

    /// Particle positions uniform within bounds; the first is the initial guess
    fn initialize_particles(
        &self,
        rng: &mut StdRng,
        bounds: &[(f64, f64)],
        initial_params: &[f64],
    ) -> Vec<Vec<f64>> {
        let mut particles = Vec::with_capacity(self.population_size);

        let mut first = initial_params.to_vec();
        clamp_to_bounds(&mut first, bounds);
        particles.push(first);

        for _ in 1..self.population_size {
            particles.push(
                bounds
                    .iter()
                    .map(|&(min, max)| if max > min { rng.gen_range(min..=max) } else { min })
                    .collect(),
            );
        }
        particles
    }

    /// Velocities within a tenth of each parameter range
    fn initialize_velocities(&self, rng: &mut StdRng, bounds: &[(f64, f64)]) -> Vec<Vec<f64>> {
        (0..self.population_size)
            .map(|_| {
                bounds
                    .iter()
                    .map(|&(min, max)| {
                        let reach = (max - min) * 0.1;
                        if reach > 0.0 { rng.gen_range(-reach..=reach) } else { 0.0 }
                    })
                    .collect()
            })
            .collect()
    }
}

impl Solver for ParticleOptimizer {
    fn name(&self) -> &str {
        "PSO"
    }

    fn solve(
        &mut self,
        problem: &dyn Problem,
        callback: &mut dyn OptimizationCallback,
    ) -> FitResult<SolverResult> {
        let n = problem.num_params();
        let bounds = problem.bounds();
        let mut rng = self.settings.rng();

        let mut particles = self.initialize_particles(&mut rng, bounds, problem.initial_params());
        let mut velocities = self.initialize_velocities(&mut rng, bounds);
        let mut own_best = particles.clone();
        let mut own_best_cost = vec![f64::INFINITY; self.population_size];
        let mut leader = 0;
        let mut global_best_cost = f64::INFINITY;
        let mut cost_evals = 0;
        let mut stagnation = Stagnation::default();

        for iter in 0..self.settings.generations {
            // One model run per particle
            let costs = evaluate_batch(problem, &particles, self.settings.parallel)?;
            cost_evals += costs.len();

            for (p, &cost) in costs.iter().enumerate() {
                if cost >= own_best_cost[p] {
                    continue;
                }
                own_best_cost[p] = cost;
                own_best[p].clone_from(&particles[p]);
                if cost < global_best_cost {
                    global_best_cost = cost;
                    leader = p;
                }
            }

            debug!(generation = iter + 1, best_cost = global_best_cost, "PSO generation");
            callback.on_iteration(iter + 1, &own_best[leader], global_best_cost)?;

            if callback.should_stop() {
                return Ok(finished(
                    true,
                    "Stopped by callback",
                    iter + 1,
                    own_best[leader].clone(),
                    global_best_cost,
                    cost_evals,
                    problem,
                ));
            }

            if global_best_cost < self.settings.precision {
                return Ok(finished(
                    true,
                    "Converged",
                    iter + 1,
                    own_best[leader].clone(),
                    global_best_cost,
                    cost_evals,
                    problem,
                ));
            }

            if stagnation.update(global_best_cost, self.settings.stagnation) {
                return Ok(finished(
                    false,
                    "Stagnated",
                    iter + 1,
                    own_best[leader].clone(),
                    global_best_cost,
                    cost_evals,
                    problem,
                ));
            }

            let best = own_best[leader].clone();
            for ((position, velocity), own) in particles.iter_mut().zip(&mut velocities).zip(&own_best) {
                for i in 0..n {
                    let r1: f64 = rng.gen_range(0.0..1.0);
                    let r2: f64 = rng.gen_range(0.0..1.0);
                    let (min, max) = bounds[i];
                    // At most a fifth of the range per generation
                    let reach = 0.2 * (max - min);
                    velocity[i] = (self.inertia * velocity[i]
                        + self.cognitive * r1 * (own[i] - position[i])
                        + self.social * r2 * (best[i] - position[i]))
                        .clamp(-reach, reach);
                    position[i] += velocity[i];
                }
                clamp_to_bounds(position, bounds);
            }
        }

        Ok(finished(
            false,
            "Max iterations reached",
            self.settings.generations,
            own_best[leader].clone(),
            global_best_cost,
            cost_evals,
            problem,
        ))
    }
}
