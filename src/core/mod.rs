pub mod constraints;
pub mod metrics;
pub mod types;

pub use constraints::{Constraint, ConstraintKind, CurveGroup, curve_map};
pub use metrics::{CurveSet, ErrorKind, ErrorMetric};
pub use types::*;
