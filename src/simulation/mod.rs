//! Boundary to the constitutive integration.
//!
//! Everything below this module speaks in [`SimError`]; the model adapter turns
//! those into EMPTY predictions so a failed integration never aborts a search.

pub mod drivers;
pub mod material;

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::subscriber::{DefaultGuard, NoSubscriber};

pub use drivers::{DriverSettings, SimSeries};
pub use material::{Damage, MaterialState, UniaxialMaterial};

pub const YOUNGS: f64 = 157_000.0;
pub const POISSONS: f64 = 0.3;
pub const S_RATE: f64 = 1.0e-4;
pub const E_RATE: f64 = 1.0e-4;
/// Creep hold in seconds.
pub const HOLD: f64 = 11_500.0 * 3600.0;
pub const NUM_STEPS: usize = 501;
pub const MIN_DATA: usize = 50;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    #[error("local solver did not converge within {0} iterations")]
    MaximumIterations(usize),

    #[error("evaluation exceeded its time limit of {0:?}")]
    Timeout(Duration),

    #[error("integration produced a non-finite state: {0}")]
    NonFinite(&'static str),
}

/// Limits applied to every model evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct SimSettings {
    /// Predicted curves shorter than this are treated as failures.
    pub min_samples: usize,
    /// Wall-clock limit for one full evaluation (all curves). `None` disables it.
    pub timeout: Option<Duration>,
    /// Iteration cap of the local Newton solve.
    pub max_iterations: usize,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            min_samples: MIN_DATA,
            timeout: None,
            max_iterations: 50,
        }
    }
}

/// Per-evaluation wall-clock limit, checked once per load step.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    limit: Option<(Instant, Duration)>,
}

impl Deadline {
    pub fn start(timeout: Option<Duration>) -> Self {
        Self {
            limit: timeout.map(|t| (Instant::now(), t)),
        }
    }

    pub fn unlimited() -> Self {
        Self { limit: None }
    }

    pub fn check(&self) -> Result<(), SimError> {
        match self.limit {
            Some((start, limit)) if start.elapsed() > limit => Err(SimError::Timeout(limit)),
            _ => Ok(()),
        }
    }
}

/// Silences tracing output on the current thread while alive.
///
/// The previous subscriber comes back when the guard drops, including on early
/// return and unwind.
pub struct QuietGuard {
    _guard: DefaultGuard,
}

impl QuietGuard {
    pub fn acquire() -> Self {
        Self {
            _guard: tracing::subscriber::set_default(NoSubscriber::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic;

    use tracing::dispatcher;

    use super::*;

    fn current_is_quiet() -> bool {
        dispatcher::get_default(|d| d.is::<NoSubscriber>())
    }

    fn current_is_registry() -> bool {
        dispatcher::get_default(|d| d.is::<tracing_subscriber::Registry>())
    }

    #[test]
    fn quiet_guard_restores_previous_subscriber() {
        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            assert!(current_is_registry());
            {
                let _quiet = QuietGuard::acquire();
                assert!(current_is_quiet());
            }
            assert!(current_is_registry());
        });
    }

    #[test]
    fn quiet_guard_restores_after_panic() {
        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let result = panic::catch_unwind(|| {
                let _quiet = QuietGuard::acquire();
                panic!("integration blew up");
            });
            assert!(result.is_err());
            assert!(current_is_registry());
        });
    }

    #[test]
    fn deadline_expires() {
        assert!(Deadline::unlimited().check().is_ok());
        assert!(Deadline::start(Some(Duration::from_secs(60))).check().is_ok());

        let expired = Deadline::start(Some(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(expired.check(), Err(SimError::Timeout(_))));
    }
}
