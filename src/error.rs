//! Typed errors for setup, I/O and search failures.
//!
//! Simulation failures are deliberately absent here: they are expected during a
//! search and are absorbed by the model adapter (see [`crate::simulation::SimError`]).
//! Everything in [`FitError`] is either a misconfiguration caught before the
//! search starts or an output problem while recording it.

use std::path::PathBuf;

use thiserror::Error;

pub type FitResult<T> = Result<T, FitError>;

#[derive(Debug, Error)]
pub enum FitError {
    #[error("unknown model '{0}' (expected one of: evpcd, evpwd, evpwd_s)")]
    UnknownModel(String),

    #[error("unknown error metric '{0}' (expected one of: y_end, x_end, y_area, dy_area)")]
    UnknownError(String),

    #[error("unknown constraint '{0}' (expected one of: inc_y_end, dec_y_end, inc_x_end, dec_x_end)")]
    UnknownConstraint(String),

    #[error("unknown solver '{0}' (expected one of: ga, pso, cmaes, nelder_mead, auto)")]
    UnknownSolver(String),

    #[error("unknown curve type '{0}' (expected creep or tensile)")]
    UnknownCurveType(String),

    #[error("parameter vector has {got} values but the model declares {expected}")]
    ParamCount { expected: usize, got: usize },

    #[error("metric '{metric}' would divide by zero: experimental curve {index} ('{test}') has a zero reference value")]
    DivisionByZero {
        metric: String,
        index: usize,
        test: String,
    },

    #[error("invalid curve '{test}': {reason}")]
    InvalidCurve { test: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no files match '{0}'")]
    NoMatch(String),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to render plot '{path}': {message}")]
    Plot { path: PathBuf, message: String },

    #[error("search failed: {0}")]
    Search(String),
}

impl FitError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    /// Process exit code used by the binary.
    ///
    /// Configuration problems exit with 2, data problems with 3, output and
    /// search problems with 4.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::UnknownModel(_)
            | Self::UnknownError(_)
            | Self::UnknownConstraint(_)
            | Self::UnknownSolver(_)
            | Self::UnknownCurveType(_)
            | Self::ParamCount { .. }
            | Self::Config(_) => 2,
            Self::DivisionByZero { .. }
            | Self::InvalidCurve { .. }
            | Self::NoMatch(_)
            | Self::Csv { .. } => 3,
            Self::Io { .. } | Self::Json { .. } | Self::Plot { .. } | Self::Search(_) => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_param_count() {
        let err = FitError::ParamCount {
            expected: 8,
            got: 7,
        };
        assert_eq!(
            err.to_string(),
            "parameter vector has 7 values but the model declares 8"
        );
    }

    #[test]
    fn unknown_names_are_configuration_errors() {
        assert_eq!(FitError::UnknownModel("foo".into()).exit_code(), 2);
        assert_eq!(FitError::UnknownConstraint("bar".into()).exit_code(), 2);
        assert!(FitError::UnknownError("baz".into()).to_string().contains("y_end"));
    }

    #[test]
    fn division_by_zero_names_the_curve() {
        let err = FitError::DivisionByZero {
            metric: "y_end".into(),
            index: 2,
            test: "G32".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("y_end"));
        assert!(msg.contains("G32"));
        assert_eq!(err.exit_code(), 3);
    }
}
