mod cma_es;
mod genetic;
mod particle;
mod simplex;
pub mod traits;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

pub use cma_es::CMAESOptimizer;
pub use genetic::GeneticOptimizer;
pub use particle::ParticleOptimizer;
pub use simplex::NelderMeadOptimizer;
pub use traits::{OptimizationCallback, Problem, Solver, SolverResult};

use crate::error::{FitError, FitResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverKind {
    Ga,
    Pso,
    Cmaes,
    NelderMead,
    Auto,
}

impl SolverKind {
    pub const ALL: [SolverKind; 5] = [Self::Ga, Self::Pso, Self::Cmaes, Self::NelderMead, Self::Auto];

    pub fn from_name(name: &str) -> FitResult<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name.trim())
            .ok_or_else(|| FitError::UnknownSolver(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ga => "ga",
            Self::Pso => "pso",
            Self::Cmaes => "cmaes",
            Self::NelderMead => "nelder_mead",
            Self::Auto => "auto",
        }
    }
}

/// Budget and stopping rules shared by every strategy.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchSettings {
    pub generations: u32,
    pub population: usize,
    pub offspring: usize,
    pub crossover: f64,
    pub mutation: f64,
    /// Stop as soon as the best fitness drops below this value.
    pub precision: f64,
    /// Generations without improvement before giving up; 0 disables.
    pub stagnation: u32,
    pub seed: u64,
    pub parallel: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            generations: 10_000,
            population: 200,
            offspring: 100,
            crossover: 0.65,
            mutation: 0.35,
            precision: 0.0,
            stagnation: 0,
            seed: 0,
            parallel: true,
        }
    }
}

impl SearchSettings {
    pub(crate) fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }
}

pub fn select_solver(
    kind: SolverKind,
    settings: &SearchSettings,
    bounds: &[(f64, f64)],
) -> (Box<dyn Solver>, String) {
    match kind {
        SolverKind::Ga => (
            Box::new(GeneticOptimizer::new(settings.clone())),
            "Evolutionary search".into(),
        ),
        SolverKind::Pso => (
            Box::new(ParticleOptimizer::new(settings.clone()).with_population_size(settings.population)),
            "Particle swarm".into(),
        ),
        SolverKind::Cmaes => (
            Box::new(CMAESOptimizer::new(settings.clone())),
            "CMA-ES".into(),
        ),
        SolverKind::NelderMead => (
            Box::new(NelderMeadOptimizer::new(settings.clone())),
            "Nelder-Mead".into(),
        ),
        SolverKind::Auto => select_automatically(settings, bounds),
    }
}

fn select_automatically(settings: &SearchSettings, bounds: &[(f64, f64)]) -> (Box<dyn Solver>, String) {
    let num_params = bounds.len().max(1);
    let ranges: Vec<f64> = bounds.iter().map(|&(min, max)| max - min).collect();
    let avg_range = ranges.iter().sum::<f64>() / num_params as f64;

    // Coefficient of variation of the parameter ranges
    let scale_variance = if ranges.len() > 1 && avg_range > 0.0 {
        let variance = ranges.iter().map(|r| (r - avg_range).powi(2)).sum::<f64>() / ranges.len() as f64;
        variance.sqrt() / avg_range
    } else {
        0.0
    };

    match (num_params, scale_variance) {
        // Ranges spanning orders of magnitude (viscosities next to exponents) -> CMA-ES
        (n, var) if var > 1.5 => (
            Box::new(CMAESOptimizer::new(settings.clone())),
            format!("Auto: {n} params, scale var {var:.2} → CMA-ES (adaptive step per parameter)"),
        ),
        // One or two parameters -> a simplex polish is enough
        (n, _) if n <= 2 && settings.generations <= 200 => (
            Box::new(NelderMeadOptimizer::new(settings.clone())),
            format!("Auto: {n} params, short budget → Nelder-Mead"),
        ),
        (n, _) if n <= 8 => {
            let pop_size = (10 + n * 3).min(30);
            (
                Box::new(ParticleOptimizer::new(settings.clone()).with_population_size(pop_size)),
                format!("Auto: {n} params → PSO (pop={pop_size})"),
            )
        }
        (n, _) => (
            Box::new(GeneticOptimizer::new(settings.clone())),
            format!("Auto: {n} params → evolutionary search"),
        ),
    }
}

#[inline]
pub fn clamp_to_bounds(params: &mut [f64], bounds: &[(f64, f64)]) {
    for (value, &(min, max)) in params.iter_mut().zip(bounds) {
        *value = value.clamp(min, max);
    }
}

/// Score a batch of candidates, across the rayon pool when `parallel`.
///
/// Results keep the order of `candidates`.
pub fn evaluate_batch(
    problem: &dyn Problem,
    candidates: &[Vec<f64>],
    parallel: bool,
) -> FitResult<Vec<f64>> {
    if parallel {
        candidates.par_iter().map(|c| problem.cost(c)).collect()
    } else {
        candidates.iter().map(|c| problem.cost(c)).collect()
    }
}

/// Counts generations without strict improvement of the best fitness.
#[derive(Debug, Default)]
pub(crate) struct Stagnation {
    best: Option<f64>,
    count: u32,
}

impl Stagnation {
    /// Record this generation's best; true once the limit is reached.
    pub(crate) fn update(&mut self, best: f64, limit: u32) -> bool {
        match self.best {
            Some(previous) if best >= previous => self.count += 1,
            _ => {
                self.best = Some(best);
                self.count = 0;
            }
        }
        limit > 0 && self.count >= limit
    }
}

pub(crate) fn finished(
    success: bool,
    message: &str,
    iterations: u32,
    params: Vec<f64>,
    cost: f64,
    cost_evals: usize,
    problem: &dyn Problem,
) -> SolverResult {
    SolverResult {
        success,
        cost,
        iterations,
        message: message.into(),
        params,
        cost_evals,
        failed_evals: problem.failed_evaluations(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Shifted sphere that remembers every vector it was asked to score.
    pub struct Quadratic {
        pub target: Vec<f64>,
        pub bounds: Vec<(f64, f64)>,
        pub initial: Vec<f64>,
        pub names: Vec<String>,
        pub seen: Mutex<Vec<Vec<f64>>>,
    }

    impl Quadratic {
        pub fn new(target: Vec<f64>, bounds: Vec<(f64, f64)>) -> Self {
            let initial = bounds.iter().map(|&(a, b)| 0.5 * (a + b)).collect();
            let names = (0..target.len()).map(|i| format!("p{i}")).collect();
            Self {
                target,
                bounds,
                initial,
                names,
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn all_in_bounds(&self) -> bool {
            let seen = self.seen.lock().unwrap();
            !seen.is_empty()
                && seen.iter().all(|p| {
                    p.iter()
                        .zip(&self.bounds)
                        .all(|(v, &(min, max))| *v >= min && *v <= max)
                })
        }
    }

    impl Problem for Quadratic {
        fn cost(&self, params: &[f64]) -> FitResult<f64> {
            self.seen.lock().unwrap().push(params.to_vec());
            Ok(params
                .iter()
                .zip(&self.target)
                .map(|(p, t)| (p - t).powi(2))
                .sum())
        }

        fn num_params(&self) -> usize {
            self.target.len()
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
    }

    /// Stops after `limit` generations and keeps the reported costs.
    #[derive(Default)]
    pub struct Budget {
        pub limit: u32,
        pub iteration: u32,
        pub costs: Vec<f64>,
    }

    impl Budget {
        pub fn new(limit: u32) -> Self {
            Self {
                limit,
                ..Self::default()
            }
        }
    }

    impl OptimizationCallback for Budget {
        fn on_iteration(&mut self, iteration: u32, _params: &[f64], cost: f64) -> FitResult<()> {
            self.iteration = iteration;
            self.costs.push(cost);
            Ok(())
        }

        fn should_stop(&self) -> bool {
            self.iteration >= self.limit
        }
    }

    pub fn settings(seed: u64) -> SearchSettings {
        SearchSettings {
            generations: 200,
            population: 30,
            offspring: 30,
            seed,
            parallel: false,
            ..SearchSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn solver_names_parse() {
        assert_eq!(SolverKind::from_name("nelder_mead").unwrap(), SolverKind::NelderMead);
        assert!(matches!(SolverKind::from_name("newton"), Err(FitError::UnknownSolver(_))));
    }

    #[test]
    fn auto_prefers_cmaes_for_badly_scaled_bounds() {
        // evpcd: Voce, Perzyna and creep-damage ranges (coefficient of variation ~2.6)
        let bounds = vec![
            (0.0, 100.0),
            (0.0, 100.0),
            (0.0, 100.0),
            (2.0, 10.0),
            (0.0, 1.0e6),
            (0.0, 1.0e4),
            (0.0, 100.0),
            (0.0, 100.0),
        ];
        let (solver, reason) = select_solver(SolverKind::Auto, &SearchSettings::default(), &bounds);
        assert_eq!(solver.name(), "CMA-ES");
        assert!(reason.contains("CMA-ES"));

        let (solver, _) = select_solver(SolverKind::Auto, &SearchSettings::default(), &[(0.0, 100.0); 2]);
        assert_eq!(solver.name(), "PSO");

        // one huge range among two small ones stays below the threshold
        let mixed = [(0.0, 100.0), (0.0, 1.0e6), (2.0, 10.0)];
        let (solver, _) = select_solver(SolverKind::Auto, &SearchSettings::default(), &mixed);
        assert_eq!(solver.name(), "PSO");
    }

    #[test]
    fn batch_keeps_candidate_order() {
        let problem = Quadratic::new(vec![0.0, 0.0], vec![(-1.0, 1.0); 2]);
        let candidates = vec![vec![1.0, 0.0], vec![0.0, 0.0], vec![1.0, 1.0]];
        let serial = evaluate_batch(&problem, &candidates, false).unwrap();
        let parallel = evaluate_batch(&problem, &candidates, true).unwrap();
        assert_eq!(serial, vec![1.0, 0.0, 2.0]);
        assert_eq!(serial, parallel);
    }

    #[test]
    fn stagnation_counts_non_improving_generations() {
        let mut stagnation = Stagnation::default();
        assert!(!stagnation.update(3.0, 2));
        assert!(!stagnation.update(3.0, 2));
        assert!(stagnation.update(3.0, 2));
        assert!(!stagnation.update(2.0, 2));
        assert!(!stagnation.update(2.0, 0));
    }

    #[test]
    fn clamp_respects_bounds() {
        let mut params = vec![-5.0, 0.5, 7.0];
        clamp_to_bounds(&mut params, &[(0.0, 1.0); 3]);
        assert_eq!(params, vec![0.0, 0.5, 1.0]);
    }
}
