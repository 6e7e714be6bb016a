//! Calibration of viscoplastic creep-damage material models.
//!
//! A [`models::ModelAdapter`] turns a parameter vector into predicted creep or
//! tensile curves, [`optimization::FitProblem`] scores them against
//! experimental curves with error metrics and ordering constraints, and the
//! strategies in [`optimization::solvers`] search the bounded parameter space.

pub mod app;
pub mod assess;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod models;
pub mod optimization;
pub mod simulation;

pub use crate::config::FitConfig;
pub use crate::core::{Curve, CurveType, ParamInfo};
pub use crate::error::{FitError, FitResult};
pub use crate::models::{ModelAdapter, ModelKind};
pub use crate::optimization::{FitProblem, SolverKind, SolverResult};
