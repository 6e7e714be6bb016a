//! Uniaxial elastic-viscoplastic material point with scalar damage.
//!
//! Stress `σ = E (1 - ω)(ε - εp)`. The viscoplastic part integrates with
//! backward Euler on the accumulated plastic strain `α`; damage is updated
//! explicitly from the converged step.

use tracing::trace;

use super::SimError;

const NEWTON_TOL: f64 = 1.0e-10;
/// Offset that lets work damage start from an undamaged state.
const WORK_DAMAGE_SEED: f64 = 1.0e-10;

/// Voce isotropic hardening: `Q(α) = s0 + R (1 - exp(-d α))`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Voce {
    pub s0: f64,
    pub r: f64,
    pub d: f64,
}

impl Voce {
    pub fn q(&self, alpha: f64) -> f64 {
        self.s0 + self.r * (1.0 - (-self.d * alpha).exp())
    }

    pub fn dq(&self, alpha: f64) -> f64 {
        self.r * self.d * (-self.d * alpha).exp()
    }
}

/// Perzyna power-law flow: `α̇ = (⟨f⟩ / η)^n`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Perzyna {
    pub n: f64,
    pub eta: f64,
}

impl Perzyna {
    pub fn rate(&self, overstress: f64) -> f64 {
        if overstress <= 0.0 {
            0.0
        } else {
            (overstress / self.eta).powf(self.n)
        }
    }

    pub fn d_rate(&self, overstress: f64) -> f64 {
        if overstress <= 0.0 {
            0.0
        } else {
            self.n / self.eta * (overstress / self.eta).powf(self.n - 1.0)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Damage {
    /// `ω̇ = (|σ| / A)^ξ (1 - ω)^(-φ)`
    ModularCreep { a: f64, xi: f64, phi: f64 },
    /// `Δω = n (ω + ω0)^((n-1)/n) |σ Δεp| / Wc`
    Work { wc: f64, n: f64 },
}

impl Damage {
    fn increment(&self, stress: f64, damage: f64, d_plastic: f64, dt: f64) -> f64 {
        match *self {
            Self::ModularCreep { a, xi, phi } => {
                dt * (stress.abs() / a).powf(xi) * (1.0 - damage).powf(-phi)
            }
            Self::Work { wc, n } => {
                let work = (stress * d_plastic).abs();
                n * (damage + WORK_DAMAGE_SEED).powf((n - 1.0) / n) * work / wc
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MaterialState {
    pub time: f64,
    pub strain: f64,
    pub stress: f64,
    pub plastic_strain: f64,
    pub alpha: f64,
    pub damage: f64,
}

impl MaterialState {
    fn ensure_finite(&self) -> Result<(), SimError> {
        let fields = [
            (self.strain, "strain"),
            (self.stress, "stress"),
            (self.plastic_strain, "plastic strain"),
            (self.alpha, "hardening variable"),
            (self.damage, "damage"),
        ];
        for (value, name) in fields {
            if !value.is_finite() {
                return Err(SimError::NonFinite(name));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UniaxialMaterial {
    pub youngs: f64,
    pub poissons: f64,
    pub hardening: Voce,
    pub flow: Perzyna,
    pub damage: Damage,
    pub max_iterations: usize,
}

impl UniaxialMaterial {
    /// Advance one step with the nominal stress prescribed.
    pub fn stress_step(
        &self,
        state: &MaterialState,
        stress: f64,
        dt: f64,
    ) -> Result<MaterialState, SimError> {
        let intact = 1.0 - state.damage;
        let effective = stress / intact;
        let sign = effective.signum();

        // r(Δα) = Δα - dt g(|σ̃| - Q(α + Δα)); Q is non-decreasing so r is too
        let d_alpha = self.solve_increment(state.alpha, |d_alpha| {
            let alpha = state.alpha + d_alpha;
            let f = effective.abs() - self.hardening.q(alpha);
            let r = d_alpha - dt * self.flow.rate(f);
            let dr = 1.0 + dt * self.flow.d_rate(f) * self.hardening.dq(alpha);
            (r, dr)
        })?;

        let plastic_strain = state.plastic_strain + sign * d_alpha;
        let strain = effective / self.youngs + plastic_strain;
        let damage =
            state.damage + self.damage.increment(stress, state.damage, sign * d_alpha, dt);

        let next = MaterialState {
            time: state.time + dt,
            strain,
            stress,
            plastic_strain,
            alpha: state.alpha + d_alpha,
            damage,
        };
        next.ensure_finite()?;
        Ok(next)
    }

    /// Advance one step with the total strain prescribed.
    pub fn strain_step(
        &self,
        state: &MaterialState,
        strain: f64,
        dt: f64,
    ) -> Result<MaterialState, SimError> {
        let trial = self.youngs * (strain - state.plastic_strain);
        let sign = trial.signum();

        let d_alpha = self.solve_increment(state.alpha, |d_alpha| {
            let alpha = state.alpha + d_alpha;
            let f = trial.abs() - self.youngs * d_alpha - self.hardening.q(alpha);
            let r = d_alpha - dt * self.flow.rate(f);
            let dr = 1.0 + dt * self.flow.d_rate(f) * (self.youngs + self.hardening.dq(alpha));
            (r, dr)
        })?;

        let plastic_strain = state.plastic_strain + sign * d_alpha;
        let effective = self.youngs * (strain - plastic_strain);
        let stress = (1.0 - state.damage) * effective;
        let damage =
            state.damage + self.damage.increment(stress, state.damage, sign * d_alpha, dt);

        let next = MaterialState {
            time: state.time + dt,
            strain,
            stress,
            plastic_strain,
            alpha: state.alpha + d_alpha,
            damage,
        };
        next.ensure_finite()?;
        Ok(next)
    }

    /// Root of an increasing, concave residual, bracketed by `[0, -r(0)]`.
    ///
    /// Newton from the left bound converges monotonically for this shape; the
    /// bracket only catches round-off and degenerate derivatives.
    fn solve_increment(
        &self,
        alpha: f64,
        residual: impl Fn(f64) -> (f64, f64),
    ) -> Result<f64, SimError> {
        let (r0, _) = residual(0.0);
        if !r0.is_finite() {
            return Err(SimError::NonFinite("flow rate"));
        }
        if r0 >= 0.0 {
            // elastic step
            return Ok(0.0);
        }

        let mut lo = 0.0;
        let mut hi = -r0;
        let mut x = 0.0;
        for iteration in 0..self.max_iterations {
            let (r, dr) = residual(x);
            if !r.is_finite() {
                return Err(SimError::NonFinite("flow rate"));
            }
            if r.abs() <= NEWTON_TOL * (1.0 + x) {
                trace!(iteration, alpha, d_alpha = x, "local solve converged");
                return Ok(x);
            }
            if r < 0.0 {
                lo = x;
            } else {
                hi = x;
            }

            let newton = x - r / dr;
            x = if dr > 0.0 && newton > lo && newton < hi {
                newton
            } else {
                0.5 * (lo + hi)
            };

            if hi - lo <= NEWTON_TOL * (1.0 + hi) {
                return Ok(x);
            }
        }
        Err(SimError::MaximumIterations(self.max_iterations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(damage: Damage) -> UniaxialMaterial {
        UniaxialMaterial {
            youngs: 157_000.0,
            poissons: 0.3,
            hardening: Voce {
                s0: 10.0,
                r: 20.0,
                d: 30.0,
            },
            flow: Perzyna { n: 4.0, eta: 1500.0 },
            damage,
            max_iterations: 50,
        }
    }

    const NO_DAMAGE: Damage = Damage::ModularCreep {
        a: 1.0e12,
        xi: 1.0,
        phi: 1.0,
    };

    #[test]
    fn below_yield_is_elastic() {
        let m = material(NO_DAMAGE);
        let next = m.stress_step(&MaterialState::default(), 5.0, 10.0).unwrap();
        assert_eq!(next.plastic_strain, 0.0);
        assert!((next.strain - 5.0 / 157_000.0).abs() < 1e-15);
    }

    #[test]
    fn creep_strain_accumulates_above_yield() {
        let m = material(NO_DAMAGE);
        let mut state = MaterialState::default();
        let mut previous = 0.0;
        for _ in 0..20 {
            state = m.stress_step(&state, 60.0, 3600.0).unwrap();
            assert!(state.plastic_strain >= previous);
            previous = state.plastic_strain;
        }
        assert!(state.plastic_strain > 0.0);
    }

    #[test]
    fn converged_increment_satisfies_flow_rule() {
        let m = material(NO_DAMAGE);
        let dt = 3600.0;
        let next = m.stress_step(&MaterialState::default(), 60.0, dt).unwrap();
        let f = 60.0 - m.hardening.q(next.alpha);
        let expected = dt * m.flow.rate(f);
        assert!((next.alpha - expected).abs() <= 1e-8 * (1.0 + next.alpha));
    }

    #[test]
    fn creep_damage_grows_under_load() {
        let m = material(Damage::ModularCreep {
            a: 2000.0,
            xi: 3.0,
            phi: 2.0,
        });
        let next = m.stress_step(&MaterialState::default(), 80.0, 3600.0).unwrap();
        assert!(next.damage > 0.0);
    }

    #[test]
    fn tensile_stress_relaxes_towards_hardening_curve() {
        let m = material(Damage::Work { wc: 50.0, n: 2.0 });
        let mut state = MaterialState::default();
        for i in 1..=50 {
            let strain = 0.001 * i as f64;
            state = m.strain_step(&state, strain, 10.0).unwrap();
        }
        assert!(state.stress > 0.0);
        assert!(state.stress < 157_000.0 * 0.05);
        assert!(state.damage > 0.0);
    }

    #[test]
    fn iteration_cap_reports_non_convergence() {
        let mut m = material(NO_DAMAGE);
        m.max_iterations = 1;
        m.flow = Perzyna { n: 10.0, eta: 1.0 };
        let err = m.stress_step(&MaterialState::default(), 90.0, 3600.0).unwrap_err();
        assert!(matches!(err, SimError::MaximumIterations(1) | SimError::NonFinite(_)));
    }

    #[test]
    fn zero_viscosity_is_non_finite() {
        let mut m = material(NO_DAMAGE);
        m.flow.eta = 0.0;
        let err = m.stress_step(&MaterialState::default(), 90.0, 1.0).unwrap_err();
        assert!(matches!(err, SimError::NonFinite(_)));
    }
}
