//! Curve-comparison error metrics.
//!
//! Every metric compares predicted curve `i` with experimental curve `i` (index
//! alignment, not content matching) and only looks at indices whose
//! experimental curve has the metric's [`CurveType`]. The returned value is the
//! mean over those indices, or `0.0` when none match.
//!
//! Reference quantities that a metric divides by are computed in
//! [`ErrorMetric::prepare`]. A zero reference is reported there as
//! [`FitError::DivisionByZero`], so a bad experimental set is rejected before
//! the search starts instead of producing infinite scores halfway through it.

use std::sync::Arc;

use crate::core::types::{Curve, CurveType};
use crate::error::{FitError, FitResult};

/// Number of resampling points used by the area metrics.
pub const AREA_POINTS: usize = 50;

/// Experimental curves shared read-only between the model, metrics and constraints.
pub type CurveSet = Arc<Vec<Curve>>;

pub trait ErrorMetric: Send + Sync {
    fn name(&self) -> &str;

    fn curve_type(&self) -> CurveType;

    /// Cache experimental-side summaries. Called once before the search.
    fn prepare(&mut self) -> FitResult<()> {
        Ok(())
    }

    /// Error of a full predicted set (same order as the experimental set).
    fn value(&self, prd: &[Curve]) -> f64;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn end(&self, curve: &Curve) -> Option<f64> {
        match self {
            Self::X => curve.x_end(),
            Self::Y => curve.y_end(),
        }
    }
}

/// Registry of the available error metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    YEnd,
    XEnd,
    YArea,
    DyArea,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 4] = [Self::YEnd, Self::XEnd, Self::YArea, Self::DyArea];

    pub fn from_name(name: &str) -> FitResult<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name.trim())
            .ok_or_else(|| FitError::UnknownError(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::YEnd => "y_end",
            Self::XEnd => "x_end",
            Self::YArea => "y_area",
            Self::DyArea => "dy_area",
        }
    }

    pub fn build(self, curve_type: CurveType, exp: CurveSet) -> Box<dyn ErrorMetric> {
        match self {
            Self::YEnd => Box::new(EndError::new(Axis::Y, curve_type, exp)),
            Self::XEnd => Box::new(EndError::new(Axis::X, curve_type, exp)),
            Self::YArea => Box::new(AreaError::new(false, curve_type, exp)),
            Self::DyArea => Box::new(AreaError::new(true, curve_type, exp)),
        }
    }
}

/// Mean of `per_index` over the indices whose experimental type matches.
fn mean_over_type(exp: &[Curve], curve_type: CurveType, mut per_index: impl FnMut(usize) -> f64) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (i, curve) in exp.iter().enumerate() {
        if curve.curve_type != curve_type {
            continue;
        }
        sum += per_index(i);
        count += 1;
    }
    if count == 0 { 0.0 } else { sum / count as f64 }
}

// ===== END-POINT METRICS =====

/// `y_end` / `x_end`: relative difference of the final sample.
pub struct EndError {
    axis: Axis,
    curve_type: CurveType,
    exp: CurveSet,
    reference: Vec<Option<f64>>,
}

impl EndError {
    pub fn new(axis: Axis, curve_type: CurveType, exp: CurveSet) -> Self {
        Self {
            axis,
            curve_type,
            exp,
            reference: Vec::new(),
        }
    }

    fn exp_end(&self, i: usize) -> f64 {
        match self.reference.get(i) {
            Some(Some(end)) => *end,
            _ => self.axis.end(&self.exp[i]).unwrap_or(f64::NAN),
        }
    }
}

impl ErrorMetric for EndError {
    fn name(&self) -> &str {
        match self.axis {
            Axis::X => "x_end",
            Axis::Y => "y_end",
        }
    }

    fn curve_type(&self) -> CurveType {
        self.curve_type
    }

    fn prepare(&mut self) -> FitResult<()> {
        let mut reference = Vec::with_capacity(self.exp.len());
        for (i, curve) in self.exp.iter().enumerate() {
            if curve.curve_type != self.curve_type {
                reference.push(None);
                continue;
            }
            let end = self.axis.end(curve).ok_or_else(|| FitError::InvalidCurve {
                test: curve.test_id.clone(),
                reason: "curve has no samples".into(),
            })?;
            if end == 0.0 || !end.is_finite() {
                return Err(FitError::DivisionByZero {
                    metric: self.name().to_string(),
                    index: i,
                    test: curve.test_id.clone(),
                });
            }
            reference.push(Some(end));
        }
        self.reference = reference;
        Ok(())
    }

    fn value(&self, prd: &[Curve]) -> f64 {
        mean_over_type(&self.exp, self.curve_type, |i| {
            let exp_end = self.exp_end(i);
            let prd_end = prd
                .get(i)
                .and_then(|c| self.axis.end(c))
                .unwrap_or(f64::NAN);
            (prd_end - exp_end).abs() / exp_end.abs()
        })
    }
}

// ===== AREA METRICS =====

#[derive(Clone, Copy, Debug)]
struct AreaReference {
    lo: f64,
    hi: f64,
    area: f64,
}

/// `y_area` / `dy_area`: normalized area between two curves (or their slopes).
///
/// Both curves are resampled on [`AREA_POINTS`] uniform points over the shared
/// x-domain. The difference area is divided by the area under the experimental
/// curve (or its slope magnitude) over its full domain. The uncovered fraction
/// of the experimental domain is added on top, so a prediction that stops early
/// is never scored as a good match of the part it does cover.
pub struct AreaError {
    derivative: bool,
    curve_type: CurveType,
    exp: CurveSet,
    reference: Vec<Option<AreaReference>>,
}

impl AreaError {
    pub fn new(derivative: bool, curve_type: CurveType, exp: CurveSet) -> Self {
        Self {
            derivative,
            curve_type,
            exp,
            reference: Vec::new(),
        }
    }

    fn reference_for(&self, curve: &Curve) -> Option<AreaReference> {
        let (lo, hi) = domain(curve)?;
        if hi <= lo {
            return None;
        }
        let grid = linspace(lo, hi, AREA_POINTS);
        let h = (hi - lo) / (AREA_POINTS - 1) as f64;
        let values = resample(curve, &grid);
        let area = if self.derivative {
            gradient(&values, h).iter().map(|g| g.abs() * h).sum()
        } else {
            let abs: Vec<f64> = values.iter().map(|v| v.abs()).collect();
            trapezoid(&abs, h)
        };
        Some(AreaReference { lo, hi, area })
    }

    fn curve_value(&self, exp: &Curve, reference: AreaReference, prd: Option<&Curve>) -> f64 {
        let Some(prd) = prd else {
            return f64::NAN;
        };
        let Some((p_lo, p_hi)) = domain(prd) else {
            return f64::NAN;
        };
        let lo = reference.lo.max(p_lo);
        let hi = reference.hi.min(p_hi);
        if hi <= lo {
            return 1.0;
        }
        let uncovered = (1.0 - (hi - lo) / (reference.hi - reference.lo)).clamp(0.0, 1.0);

        let grid = linspace(lo, hi, AREA_POINTS);
        let h = (hi - lo) / (AREA_POINTS - 1) as f64;
        let exp_values = resample(exp, &grid);
        let prd_values = resample(prd, &grid);

        let diff_area = if self.derivative {
            let ge = gradient(&exp_values, h);
            let gp = gradient(&prd_values, h);
            ge.iter().zip(gp.iter()).map(|(a, b)| (a - b).abs() * h).sum()
        } else {
            let diff: Vec<f64> = exp_values
                .iter()
                .zip(prd_values.iter())
                .map(|(a, b)| (a - b).abs())
                .collect();
            trapezoid(&diff, h)
        };

        diff_area / reference.area + uncovered
    }
}

impl ErrorMetric for AreaError {
    fn name(&self) -> &str {
        if self.derivative { "dy_area" } else { "y_area" }
    }

    fn curve_type(&self) -> CurveType {
        self.curve_type
    }

    fn prepare(&mut self) -> FitResult<()> {
        let mut reference = Vec::with_capacity(self.exp.len());
        for (i, curve) in self.exp.iter().enumerate() {
            if curve.curve_type != self.curve_type {
                reference.push(None);
                continue;
            }
            let area = self.reference_for(curve).ok_or_else(|| FitError::InvalidCurve {
                test: curve.test_id.clone(),
                reason: "curve needs at least two distinct x values".into(),
            })?;
            if area.area == 0.0 || !area.area.is_finite() {
                return Err(FitError::DivisionByZero {
                    metric: self.name().to_string(),
                    index: i,
                    test: curve.test_id.clone(),
                });
            }
            reference.push(Some(area));
        }
        self.reference = reference;
        Ok(())
    }

    fn value(&self, prd: &[Curve]) -> f64 {
        mean_over_type(&self.exp, self.curve_type, |i| {
            let exp = &self.exp[i];
            let reference = match self.reference.get(i) {
                Some(Some(r)) => Some(*r),
                _ => self.reference_for(exp),
            };
            match reference {
                Some(r) => self.curve_value(exp, r, prd.get(i)),
                None => f64::NAN,
            }
        })
    }
}

// ===== RESAMPLING HELPERS =====

fn domain(curve: &Curve) -> Option<(f64, f64)> {
    Some((*curve.x.first()?, *curve.x.last()?))
}

pub fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    let n = n.max(2);
    let step = (hi - lo) / (n - 1) as f64;
    (0..n).map(|i| lo + step * i as f64).collect()
}

/// Piecewise-linear interpolation of an ascending-x series, clamped at the ends.
pub fn interpolate(x: &[f64], y: &[f64], at: f64) -> f64 {
    let n = x.len().min(y.len());
    if n == 0 {
        return f64::NAN;
    }
    if at <= x[0] {
        return y[0];
    }
    if at >= x[n - 1] {
        return y[n - 1];
    }
    let j = x[..n].partition_point(|&v| v <= at).clamp(1, n - 1);
    let (x0, x1, y0, y1) = (x[j - 1], x[j], y[j - 1], y[j]);
    if x1 == x0 {
        y1
    } else {
        y0 + (y1 - y0) * (at - x0) / (x1 - x0)
    }
}

fn resample(curve: &Curve, grid: &[f64]) -> Vec<f64> {
    grid.iter().map(|&g| interpolate(&curve.x, &curve.y, g)).collect()
}

fn gradient(values: &[f64], h: f64) -> Vec<f64> {
    values.windows(2).map(|w| (w[1] - w[0]) / h).collect()
}

fn trapezoid(values: &[f64], h: f64) -> f64 {
    values.windows(2).map(|w| 0.5 * (w[0] + w[1]) * h).sum()
}
