pub mod callback;
pub mod problem;
pub mod solvers;

pub use callback::CalibrationRecorder;
pub use problem::{Evaluation, FitProblem, Term};
pub use solvers::{
    CMAESOptimizer, GeneticOptimizer, NelderMeadOptimizer, ParticleOptimizer, SearchSettings,
    SolverKind, select_solver,
};
pub use solvers::{OptimizationCallback, Problem, Solver, SolverResult};
