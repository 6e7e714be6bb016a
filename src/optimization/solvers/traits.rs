use crate::error::FitResult;

#[derive(Clone, Debug)]
pub struct SolverResult {
    pub success: bool,
    pub cost: f64,
    pub iterations: u32,
    pub message: String,
    pub params: Vec<f64>,
    pub cost_evals: usize,
    /// Evaluations whose model run came back EMPTY.
    pub failed_evals: usize,
}

/// Callback interface for search progress
pub trait OptimizationCallback {
    /// Called once per generation with the best parameters found so far
    fn on_iteration(&mut self, iteration: u32, params: &[f64], cost: f64) -> FitResult<()>;

    /// Check if the search should stop early
    fn should_stop(&self) -> bool {
        false
    }
}

/// Core problem definition - just the essentials
///
/// `Sync` because solvers may score a whole population across threads.
pub trait Problem: Sync {
    /// Fitness of a parameter vector (runs the model). Lower is better.
    ///
    /// Failed model runs are not errors: they come back as the worst fitness.
    /// An `Err` means the problem itself is misconfigured.
    fn cost(&self, params: &[f64]) -> FitResult<f64>;

    /// Number of parameters
    fn num_params(&self) -> usize;

    /// Starting point
    fn initial_params(&self) -> &[f64];

    /// Parameter bounds (min, max) for each parameter
    fn bounds(&self) -> &[(f64, f64)];

    fn param_names(&self) -> &[String];

    /// Number of evaluations so far that produced no prediction.
    fn failed_evaluations(&self) -> usize {
        0
    }
}

/// Solver interface - takes problem and callback
pub trait Solver {
    fn name(&self) -> &str;

    /// Run the search, reporting each generation to `callback`
    fn solve(
        &mut self,
        problem: &dyn Problem,
        callback: &mut dyn OptimizationCallback,
    ) -> FitResult<SolverResult>;
}

// ============================================================================
// ADDING A SEARCH STRATEGY
// ============================================================================
//
// 1. Store the hyperparameters plus a `SearchSettings` (budget, target
//    fitness, stagnation limit, seed, parallel flag) on the solver struct.
//
// 2. Draw every random number from a `StdRng` seeded from the settings, on the
//    calling thread. Workers only ever run `problem.cost`, so a run is
//    reproducible for a given seed whatever the thread count.
//
// 3. Clamp every candidate with `clamp_to_bounds` before scoring it. Score a
//    population in one `evaluate_batch` call so it can fan out over rayon.
//
// 4. After each generation call `callback.on_iteration(generation, best, cost)`
//    then check, in this order:
//      - callback.should_stop()     -> "Stopped by callback"
//      - best < settings.precision  -> "Converged"
//      - stagnation counter         -> "Stagnated"
//
// 5. problem.cost() is EXPENSIVE: a full set of creep/tensile integrations.
//    Track cost_evals and fill failed_evals from problem.failed_evaluations().
//
// 6. Register the strategy in `SolverKind` and `select_solver` (mod.rs).
//
// ============================================================================
