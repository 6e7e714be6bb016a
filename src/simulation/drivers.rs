//! Load histories for the two test types.

use tracing::trace;

use super::material::{MaterialState, UniaxialMaterial};
use super::{Deadline, E_RATE, HOLD, NUM_STEPS, S_RATE, SimError};

#[derive(Clone, Debug, PartialEq)]
pub struct DriverSettings {
    /// Stress rate of the creep loading ramp (MPa/s).
    pub srate: f64,
    /// Strain rate of the tensile test (1/s).
    pub erate: f64,
    /// Creep hold duration (s).
    pub hold: f64,
    /// Steps of the creep hold and of the tensile test.
    pub nsteps: usize,
    /// Steps of the creep loading ramp.
    pub nsteps_up: usize,
    /// Final tensile strain.
    pub emax: f64,
    /// Damage at which a test is considered ruptured.
    pub dtol: f64,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            srate: S_RATE,
            erate: E_RATE,
            hold: HOLD,
            nsteps: NUM_STEPS,
            nsteps_up: 150,
            emax: 0.5,
            dtol: 0.95,
        }
    }
}

/// Raw driver output before it is wrapped into a curve.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimSeries {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub damage: Vec<f64>,
}

impl SimSeries {
    fn push(&mut self, x: f64, y: f64, damage: f64) {
        self.x.push(x);
        self.y.push(y);
        self.damage.push(damage);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Largest damage growth accepted in a single integration step.
const MAX_DAMAGE_INCREMENT: f64 = 0.05;
/// Step halvings allowed within one recorded step.
const MAX_CUTS: usize = 30;

/// Outcome of advancing over one recorded step.
enum Advance {
    Completed(MaterialState),
    /// Damage would pass `dtol`; carries the last state below it.
    Ruptured(MaterialState),
}

/// Advance `state` over `dt`, halving the step while damage grows by more
/// than [`MAX_DAMAGE_INCREMENT`].
///
/// `step(state, fraction, dt)` integrates up to `fraction` of the recorded
/// step so that prescribed loads can be interpolated.
fn advance(
    state: &MaterialState,
    dt: f64,
    dtol: f64,
    step: impl Fn(&MaterialState, f64, f64) -> Result<MaterialState, SimError>,
) -> Result<Advance, SimError> {
    let mut current = *state;
    let mut done = 0.0;
    let mut size = 1.0_f64;
    let mut cuts = 0;
    while done < 1.0 {
        let (fraction, span) = if done + size >= 1.0 {
            (1.0, 1.0 - done)
        } else {
            (done + size, size)
        };
        let trial = step(&current, fraction, dt * span)?;
        if trial.damage - current.damage > MAX_DAMAGE_INCREMENT && cuts < MAX_CUTS {
            size *= 0.5;
            cuts += 1;
            continue;
        }
        if !(0.0..=dtol).contains(&trial.damage) {
            trace!(damage = current.damage, cuts, "ruptured");
            return Ok(Advance::Ruptured(current));
        }
        current = trial;
        done = fraction;
    }
    Ok(Advance::Completed(current))
}

/// Ramp to `stress`, then hold it.
///
/// Returns hold time in hours against the creep strain accumulated since the
/// end of the ramp. Every recorded damage stays within `[0, dtol]`; the curve
/// ends at the last state before damage would pass `dtol`.
pub fn creep(
    material: &UniaxialMaterial,
    stress: f64,
    temperature: f64,
    settings: &DriverSettings,
    deadline: &Deadline,
) -> Result<SimSeries, SimError> {
    trace!(stress, temperature, "creep test");

    let mut state = MaterialState::default();
    let ramp_steps = settings.nsteps_up.max(1);
    let ramp_dt = stress.abs() / settings.srate / ramp_steps as f64;
    for i in 0..ramp_steps {
        deadline.check()?;
        let load = |fraction: f64| stress * (i as f64 + fraction) / ramp_steps as f64;
        match advance(&state, ramp_dt, settings.dtol, |s, f, dt| {
            material.stress_step(s, load(f), dt)
        })? {
            Advance::Completed(next) => state = next,
            Advance::Ruptured(last) => {
                let mut series = SimSeries::default();
                series.push(0.0, 0.0, last.damage);
                return Ok(series);
            }
        }
    }

    let start_time = state.time;
    let start_strain = state.strain;
    let mut series = SimSeries::default();
    series.push(0.0, 0.0, state.damage);

    let hold_steps = settings.nsteps.max(1);
    let hold_dt = settings.hold / hold_steps as f64;
    for _ in 0..hold_steps {
        deadline.check()?;
        let (next, ruptured) = match advance(&state, hold_dt, settings.dtol, |s, _, dt| {
            material.stress_step(s, stress, dt)
        })? {
            Advance::Completed(next) => (next, false),
            Advance::Ruptured(last) => (last, true),
        };
        if next.time > state.time {
            series.push(
                (next.time - start_time) / 3600.0,
                next.strain - start_strain,
                next.damage,
            );
        }
        state = next;
        if ruptured {
            break;
        }
    }
    Ok(series)
}

/// Strain-controlled pull to `emax`; returns strain against stress.
///
/// Ends at the last state before damage would pass `dtol`.
pub fn tensile(
    material: &UniaxialMaterial,
    temperature: f64,
    settings: &DriverSettings,
    deadline: &Deadline,
) -> Result<SimSeries, SimError> {
    trace!(temperature, "tensile test");

    let steps = settings.nsteps.max(1);
    let de = settings.emax / steps as f64;
    let dt = de / settings.erate;

    let mut state = MaterialState::default();
    let mut series = SimSeries::default();
    series.push(0.0, 0.0, 0.0);
    for i in 0..steps {
        deadline.check()?;
        let (next, ruptured) = match advance(&state, dt, settings.dtol, |s, f, dt| {
            material.strain_step(s, de * (i as f64 + f), dt)
        })? {
            Advance::Completed(next) => (next, false),
            Advance::Ruptured(last) => (last, true),
        };
        if next.time > state.time {
            series.push(next.strain, next.stress, next.damage);
        }
        state = next;
        if ruptured {
            break;
        }
    }
    Ok(series)
}
