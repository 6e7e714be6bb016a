use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FitError, FitResult};

// ===== ENUMS =====

/// Kind of mechanical test a curve comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveType {
    /// Constant stress held until rupture; x = time (h), y = strain.
    Creep,
    /// Constant strain rate up to a strain limit; x = strain, y = stress (MPa).
    Tensile,
}

impl CurveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creep => "creep",
            Self::Tensile => "tensile",
        }
    }

    /// Default axis labels `(x, y)` for curves of this type.
    pub fn default_labels(&self) -> (&'static str, &'static str) {
        match self {
            Self::Creep => ("time", "strain"),
            Self::Tensile => ("strain", "stress"),
        }
    }
}

impl fmt::Display for CurveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurveType {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "creep" => Ok(Self::Creep),
            "tensile" => Ok(Self::Tensile),
            other => Err(FitError::UnknownCurveType(other.to_string())),
        }
    }
}

// ===== CORE DATA TYPES =====

/// One experimental or predicted curve with its test conditions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    #[serde(rename = "type")]
    pub curve_type: CurveType,
    /// Applied stress (MPa).
    pub stress: f64,
    /// Test temperature (°C).
    pub temp: f64,
    pub test_id: String,
    pub x_label: String,
    pub y_label: String,
}

impl Curve {
    /// Build a curve with the default axis labels for its type.
    ///
    /// Returns an error if the sample sequences differ in length.
    pub fn new(
        x: Vec<f64>,
        y: Vec<f64>,
        curve_type: CurveType,
        stress: f64,
        temp: f64,
        test_id: impl Into<String>,
    ) -> FitResult<Self> {
        let test_id = test_id.into();
        if x.len() != y.len() {
            return Err(FitError::InvalidCurve {
                test: test_id,
                reason: format!("x has {} samples but y has {}", x.len(), y.len()),
            });
        }
        let (x_label, y_label) = curve_type.default_labels();
        Ok(Self {
            x,
            y,
            curve_type,
            stress,
            temp,
            test_id,
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
        })
    }

    /// A sample-free curve carrying only test conditions.
    pub fn condition(curve_type: CurveType, stress: f64, temp: f64) -> Self {
        let (x_label, y_label) = curve_type.default_labels();
        Self {
            x: vec![0.0],
            y: vec![0.0],
            curve_type,
            stress,
            temp,
            test_id: format!("{curve_type}_{stress}MPa_{temp}C"),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
        }
    }

    /// Same conditions and labels, new samples.
    pub fn with_samples(&self, x: Vec<f64>, y: Vec<f64>) -> Self {
        Self {
            x,
            y,
            curve_type: self.curve_type,
            stress: self.stress,
            temp: self.temp,
            test_id: self.test_id.clone(),
            x_label: self.x_label.clone(),
            y_label: self.y_label.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.x.len().min(self.y.len())
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty() || self.y.is_empty()
    }

    /// A curve is valid when both axes hold at least `min_samples` finite values.
    pub fn is_valid(&self, min_samples: usize) -> bool {
        !self.is_empty()
            && self.x.len() == self.y.len()
            && self.x.len() >= min_samples
            && self.x.iter().chain(self.y.iter()).all(|v| v.is_finite())
    }

    pub fn x_end(&self) -> Option<f64> {
        self.x.last().copied()
    }

    pub fn y_end(&self) -> Option<f64> {
        self.y.last().copied()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }
}

/// Name and bounds of one free model parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamInfo {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

impl ParamInfo {
    pub fn new(name: &str, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            min,
            max,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn midpoint(&self) -> f64 {
        0.5 * (self.min + self.max)
    }
}

/// Check that a parameter vector matches the declared parameter list.
///
/// Only the length is enforced; staying inside the bounds is the search
/// driver's responsibility.
pub fn validate_params(info: &[ParamInfo], params: &[f64]) -> FitResult<()> {
    if info.len() != params.len() {
        return Err(FitError::ParamCount {
            expected: info.len(),
            got: params.len(),
        });
    }
    Ok(())
}

pub fn bounds_of(info: &[ParamInfo]) -> Vec<(f64, f64)> {
    info.iter().map(|p| (p.min, p.max)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_rejects_length_mismatch() {
        let err = Curve::new(vec![0.0, 1.0], vec![0.0], CurveType::Creep, 80.0, 800.0, "G1")
            .unwrap_err();
        assert!(matches!(err, FitError::InvalidCurve { .. }));
    }

    #[test]
    fn validity_requires_minimum_samples() {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let curve = Curve::new(x.clone(), x, CurveType::Tensile, 0.0, 20.0, "T1").unwrap();
        assert!(curve.is_valid(10));
        assert!(!curve.is_valid(11));

        let mut broken = curve.clone();
        broken.y[3] = f64::NAN;
        assert!(!broken.is_valid(1));
    }

    #[test]
    fn curve_type_parses_case_insensitively() {
        assert_eq!("Creep".parse::<CurveType>().unwrap(), CurveType::Creep);
        assert_eq!(" tensile ".parse::<CurveType>().unwrap(), CurveType::Tensile);
        assert!("fatigue".parse::<CurveType>().is_err());
    }

    #[test]
    fn validate_params_checks_length_only() {
        let info = vec![ParamInfo::new("a", 0.0, 1.0), ParamInfo::new("b", 0.0, 1.0)];
        assert!(validate_params(&info, &[0.5, 2.0]).is_ok());
        assert!(matches!(
            validate_params(&info, &[0.5]),
            Err(FitError::ParamCount { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn with_samples_keeps_conditions() {
        let exp = Curve::new(vec![0.0, 10.0], vec![0.0, 0.02], CurveType::Creep, 80.0, 800.0, "G25")
            .unwrap();
        let prd = exp.with_samples(vec![0.0, 5.0, 10.0], vec![0.0, 0.01, 0.018]);
        assert_eq!(prd.test_id, "G25");
        assert_eq!(prd.stress, 80.0);
        assert_eq!(prd.y_end(), Some(0.018));
    }
}
