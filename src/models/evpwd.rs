use std::collections::BTreeMap;

use super::Model;
use crate::core::ParamInfo;
use crate::error::{FitError, FitResult};
use crate::simulation::material::{Damage, Perzyna, Voce};
use crate::simulation::{POISSONS, UniaxialMaterial, YOUNGS};

fn work_damage_params() -> [ParamInfo; 2] {
    [
        ParamInfo::new("wd_wc", 0.0, 1.0e2),
        ParamInfo::new("wd_n", 0.0, 1.0e2),
    ]
}

fn build(hardening: Voce, flow: Perzyna, wc: f64, n: f64, max_iterations: usize) -> UniaxialMaterial {
    UniaxialMaterial {
        youngs: YOUNGS,
        poissons: POISSONS,
        hardening,
        flow,
        damage: Damage::Work { wc, n },
        max_iterations,
    }
}

/// Elastic-viscoplastic model with plastic-work damage, all parameters free.
pub struct Evpwd {
    param_info: Vec<ParamInfo>,
}

impl Evpwd {
    pub fn new() -> Self {
        let mut param_info = vec![
            ParamInfo::new("evp_s0", 0.0, 1.0e2),
            ParamInfo::new("evp_R", 0.0, 1.0e2),
            ParamInfo::new("evp_d", 0.0, 1.0e2),
            ParamInfo::new("evp_n", 2.0, 1.0e1),
            ParamInfo::new("evp_eta", 0.0, 1.0e6),
        ];
        param_info.extend(work_damage_params());
        Self { param_info }
    }
}

impl Default for Evpwd {
    fn default() -> Self {
        Self::new()
    }
}

impl Model for Evpwd {
    fn name(&self) -> &str {
        "evpwd"
    }

    fn param_info(&self) -> &[ParamInfo] {
        &self.param_info
    }

    fn material(&self, params: &[f64], max_iterations: usize) -> FitResult<UniaxialMaterial> {
        let &[s0, r, d, n, eta, wc, wd_n] = params else {
            return Err(FitError::ParamCount {
                expected: self.param_info.len(),
                got: params.len(),
            });
        };
        Ok(build(Voce { s0, r, d }, Perzyna { n, eta }, wc, wd_n, max_iterations))
    }
}

/// Work damage fitted on top of a previously calibrated viscoplastic part.
pub struct EvpwdS {
    param_info: Vec<ParamInfo>,
    hardening: Voce,
    flow: Perzyna,
}

impl EvpwdS {
    pub const FIXED_NAMES: [&'static str; 5] = ["evp_s0", "evp_R", "evp_d", "evp_n", "evp_eta"];

    pub fn new() -> Self {
        Self {
            param_info: work_damage_params().to_vec(),
            hardening: Voce {
                s0: 0.671972514,
                r: 25.74997349,
                d: 43.16881374,
            },
            flow: Perzyna {
                n: 4.487884698,
                eta: 1669.850786,
            },
        }
    }

    /// Replace parts of the fixed viscoplastic calibration.
    pub fn with_fixed(mut self, fixed: &BTreeMap<String, f64>) -> FitResult<Self> {
        for (name, &value) in fixed {
            match name.as_str() {
                "evp_s0" => self.hardening.s0 = value,
                "evp_R" => self.hardening.r = value,
                "evp_d" => self.hardening.d = value,
                "evp_n" => self.flow.n = value,
                "evp_eta" => self.flow.eta = value,
                other => {
                    return Err(FitError::Config(format!(
                        "evpwd_s cannot fix '{other}' (fixable: {})",
                        Self::FIXED_NAMES.join(", ")
                    )));
                }
            }
        }
        Ok(self)
    }
}

impl Default for EvpwdS {
    fn default() -> Self {
        Self::new()
    }
}

impl Model for EvpwdS {
    fn name(&self) -> &str {
        "evpwd_s"
    }

    fn param_info(&self) -> &[ParamInfo] {
        &self.param_info
    }

    fn material(&self, params: &[f64], max_iterations: usize) -> FitResult<UniaxialMaterial> {
        let &[wc, n] = params else {
            return Err(FitError::ParamCount {
                expected: self.param_info.len(),
                got: params.len(),
            });
        };
        Ok(build(self.hardening, self.flow, wc, n, max_iterations))
    }
}
