use super::Model;
use crate::core::ParamInfo;
use crate::error::{FitError, FitResult};
use crate::simulation::material::{Damage, Perzyna, Voce};
use crate::simulation::{POISSONS, UniaxialMaterial, YOUNGS};

/// Elastic-viscoplastic model with modular creep damage.
pub struct Evpcd {
    param_info: Vec<ParamInfo>,
}

impl Evpcd {
    pub fn new() -> Self {
        Self {
            param_info: vec![
                ParamInfo::new("evp_s0", 0.0, 1.0e2),
                ParamInfo::new("evp_R", 0.0, 1.0e2),
                ParamInfo::new("evp_d", 0.0, 1.0e2),
                ParamInfo::new("evp_n", 2.0, 1.0e1),
                ParamInfo::new("evp_eta", 0.0, 1.0e6),
                ParamInfo::new("cd_A", 0.0, 1.0e4),
                ParamInfo::new("cd_xi", 0.0, 1.0e2),
                ParamInfo::new("cd_phi", 0.0, 1.0e2),
            ],
        }
    }
}

impl Default for Evpcd {
    fn default() -> Self {
        Self::new()
    }
}

impl Model for Evpcd {
    fn name(&self) -> &str {
        "evpcd"
    }

    fn param_info(&self) -> &[ParamInfo] {
        &self.param_info
    }

    fn material(&self, params: &[f64], max_iterations: usize) -> FitResult<UniaxialMaterial> {
        let &[s0, r, d, n, eta, a, xi, phi] = params else {
            return Err(FitError::ParamCount {
                expected: self.param_info.len(),
                got: params.len(),
            });
        };
        Ok(UniaxialMaterial {
            youngs: YOUNGS,
            poissons: POISSONS,
            hardening: Voce { s0, r, d },
            flow: Perzyna { n, eta },
            damage: Damage::ModularCreep { a, xi, phi },
            max_iterations,
        })
    }
}
