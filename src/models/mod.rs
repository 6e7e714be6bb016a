//! Material models and the adapter that turns a parameter vector into
//! predicted curves.

pub mod evpcd;
pub mod evpwd;

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::{Curve, CurveSet, CurveType, ParamInfo, validate_params};
use crate::error::{FitError, FitResult};
use crate::simulation::{
    Deadline, DriverSettings, QuietGuard, SimError, SimSeries, SimSettings, UniaxialMaterial, drivers,
};

pub use evpcd::Evpcd;
pub use evpwd::{Evpwd, EvpwdS};

const KELVIN_OFFSET: f64 = 273.15;

/// A named, bounded parameterization of [`UniaxialMaterial`].
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    fn param_info(&self) -> &[ParamInfo];

    fn material(&self, params: &[f64], max_iterations: usize) -> FitResult<UniaxialMaterial>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    Evpcd,
    Evpwd,
    EvpwdS,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [Self::Evpcd, Self::Evpwd, Self::EvpwdS];

    pub fn from_name(name: &str) -> FitResult<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name.trim())
            .ok_or_else(|| FitError::UnknownModel(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Evpcd => "evpcd",
            Self::Evpwd => "evpwd",
            Self::EvpwdS => "evpwd_s",
        }
    }

    /// Build the model, applying `fixed` values where the model supports them.
    pub fn build(self, fixed: &BTreeMap<String, f64>) -> FitResult<Box<dyn Model>> {
        if !fixed.is_empty() && self != Self::EvpwdS {
            return Err(FitError::Config(format!(
                "model '{}' has no fixed parameters",
                self.name()
            )));
        }
        Ok(match self {
            Self::Evpcd => Box::new(Evpcd::new()),
            Self::Evpwd => Box::new(Evpwd::new()),
            Self::EvpwdS => Box::new(EvpwdS::new().with_fixed(fixed)?),
        })
    }
}

/// Runs a [`Model`] against a set of test conditions.
///
/// Holds only parameter-independent state, so one adapter is shared by every
/// worker; each evaluation builds its own material and integration state.
pub struct ModelAdapter {
    model: Box<dyn Model>,
    exp_curves: CurveSet,
    settings: SimSettings,
    drivers: DriverSettings,
}

impl ModelAdapter {
    pub fn new(model: Box<dyn Model>, exp_curves: CurveSet) -> Self {
        Self {
            model,
            exp_curves,
            settings: SimSettings::default(),
            drivers: DriverSettings::default(),
        }
    }

    pub fn from_name(
        name: &str,
        fixed: &BTreeMap<String, f64>,
        exp_curves: CurveSet,
    ) -> FitResult<Self> {
        let model = ModelKind::from_name(name)?.build(fixed)?;
        Ok(Self::new(model, exp_curves))
    }

    pub fn with_settings(mut self, settings: SimSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_drivers(mut self, drivers: DriverSettings) -> Self {
        self.drivers = drivers;
        self
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn param_info(&self) -> &[ParamInfo] {
        self.model.param_info()
    }

    pub fn param_names(&self) -> Vec<String> {
        self.param_info().iter().map(|p| p.name.clone()).collect()
    }

    pub fn exp_curves(&self) -> &CurveSet {
        &self.exp_curves
    }

    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    pub fn material(&self, params: &[f64]) -> FitResult<UniaxialMaterial> {
        validate_params(self.param_info(), params)?;
        self.model.material(params, self.settings.max_iterations)
    }

    /// Integrate every condition. Log output is suppressed for the duration.
    pub fn simulate(
        &self,
        material: &UniaxialMaterial,
        conditions: &[Curve],
    ) -> Result<Vec<SimSeries>, SimError> {
        let _quiet = QuietGuard::acquire();
        let deadline = Deadline::start(self.settings.timeout);
        conditions
            .iter()
            .map(|condition| {
                let temperature = condition.temp + KELVIN_OFFSET;
                match condition.curve_type {
                    CurveType::Creep => drivers::creep(
                        material,
                        condition.stress,
                        temperature,
                        &self.drivers,
                        &deadline,
                    ),
                    CurveType::Tensile => {
                        drivers::tensile(material, temperature, &self.drivers, &deadline)
                    }
                }
            })
            .collect()
    }

    /// Predicted curves for `conditions`, or `None` (EMPTY) when any of them
    /// fails to integrate or comes out too short.
    ///
    /// Errors only for a malformed parameter vector.
    pub fn predict(&self, params: &[f64], conditions: &[Curve]) -> FitResult<Option<Vec<Curve>>> {
        let material = self.material(params)?;
        let series = match self.simulate(&material, conditions) {
            Ok(series) => series,
            Err(e) => {
                debug!(model = self.name(), error = %e, "simulation failed");
                return Ok(None);
            }
        };

        let mut curves = Vec::with_capacity(conditions.len());
        for (condition, series) in conditions.iter().zip(series) {
            let curve = condition.with_samples(series.x, series.y);
            if !curve.is_valid(self.settings.min_samples) {
                debug!(
                    model = self.name(),
                    test = %condition.test_id,
                    samples = curve.len(),
                    "prediction rejected"
                );
                return Ok(None);
            }
            curves.push(curve);
        }
        Ok(Some(curves))
    }

    /// Predictions for the experimental set, index-aligned with it.
    pub fn evaluate(&self, params: &[f64]) -> FitResult<Option<Vec<Curve>>> {
        self.predict(params, &self.exp_curves)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const EVPCD_PARAMS: [f64; 8] = [
        0.671972514,
        25.74997349,
        43.16881374,
        4.487884698,
        1669.850786,
        8000.0,
        4.0,
        4.0,
    ];

    fn creep_set() -> CurveSet {
        Arc::new(vec![Curve::condition(CurveType::Creep, 80.0, 800.0)])
    }

    #[test]
    fn unknown_model_is_rejected() {
        assert!(matches!(ModelKind::from_name("evp"), Err(FitError::UnknownModel(_))));
        assert!(matches!(
            ModelAdapter::from_name("nope", &BTreeMap::new(), creep_set()),
            Err(FitError::UnknownModel(_))
        ));
    }

    #[test]
    fn fixed_params_only_for_separated_model() {
        let fixed = BTreeMap::from([("evp_s0".to_string(), 1.0)]);
        assert!(ModelKind::EvpwdS.build(&fixed).is_ok());
        assert!(matches!(ModelKind::Evpcd.build(&fixed), Err(FitError::Config(_))));
    }

    #[test]
    fn wrong_length_is_a_setup_error() {
        let adapter = ModelAdapter::from_name("evpcd", &BTreeMap::new(), creep_set()).unwrap();
        assert!(matches!(
            adapter.evaluate(&[1.0; 7]),
            Err(FitError::ParamCount { expected: 8, got: 7 })
        ));
    }

    #[test]
    fn evaluation_is_idempotent() {
        let adapter = ModelAdapter::from_name("evpcd", &BTreeMap::new(), creep_set()).unwrap();
        let first = adapter.evaluate(&EVPCD_PARAMS).unwrap();
        let second = adapter.evaluate(&EVPCD_PARAMS).unwrap();
        assert!(first.is_some());
        assert_eq!(first, second);

        let curves = first.unwrap();
        assert_eq!(curves.len(), 1);
        assert_eq!(curves[0].stress, 80.0);
        assert!(curves[0].len() >= adapter.settings().min_samples);
    }

    #[test]
    fn non_convergence_collapses_to_empty() {
        let adapter = ModelAdapter::from_name("evpcd", &BTreeMap::new(), creep_set())
            .unwrap()
            .with_settings(SimSettings {
                max_iterations: 1,
                ..SimSettings::default()
            });
        let mut params = EVPCD_PARAMS;
        params[4] = 1.0;
        assert_eq!(adapter.evaluate(&params).unwrap(), None);
    }

    #[test]
    fn short_predictions_collapse_to_empty() {
        let adapter = ModelAdapter::from_name("evpcd", &BTreeMap::new(), creep_set())
            .unwrap()
            .with_settings(SimSettings {
                min_samples: 10_000,
                ..SimSettings::default()
            });
        assert_eq!(adapter.evaluate(&EVPCD_PARAMS).unwrap(), None);
    }
}
