use indexmap::IndexMap;

use super::metrics::{Axis, CurveSet};
use super::types::{Curve, CurveType};
use crate::error::{FitError, FitResult};

/// Experimental curves sharing one temperature, ordered by ascending stress.
#[derive(Clone, Debug, PartialEq)]
pub struct CurveGroup {
    pub temp: f64,
    pub indices: Vec<usize>,
}

/// Group curve indices by temperature
///
/// Groups keep first-seen temperature order; indices inside a group are sorted
/// by ascending stress (stable, so equal stresses keep file order).
pub fn curve_map(curves: &[Curve]) -> Vec<CurveGroup> {
    // f64 is not Hash; key on the bit pattern with -0.0 folded into 0.0
    let mut groups: IndexMap<u64, CurveGroup> = IndexMap::new();
    for (i, curve) in curves.iter().enumerate() {
        let key = (curve.temp + 0.0).to_bits();
        groups
            .entry(key)
            .or_insert_with(|| CurveGroup {
                temp: curve.temp,
                indices: Vec::new(),
            })
            .indices
            .push(i);
    }

    groups
        .into_values()
        .map(|mut group| {
            group
                .indices
                .sort_by(|&a, &b| curves[a].stress.total_cmp(&curves[b].stress));
            group
        })
        .collect()
}

/// Ordering penalty across a predicted set. Zero when satisfied, positive otherwise.
pub trait Constraint: Send + Sync {
    fn name(&self) -> &str;

    fn curve_type(&self) -> CurveType;

    fn value(&self, prd: &[Curve]) -> f64;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintKind {
    IncYEnd,
    DecYEnd,
    IncXEnd,
    DecXEnd,
}

impl ConstraintKind {
    pub const ALL: [ConstraintKind; 4] = [Self::IncYEnd, Self::DecYEnd, Self::IncXEnd, Self::DecXEnd];

    pub fn from_name(name: &str) -> FitResult<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name.trim())
            .ok_or_else(|| FitError::UnknownConstraint(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::IncYEnd => "inc_y_end",
            Self::DecYEnd => "dec_y_end",
            Self::IncXEnd => "inc_x_end",
            Self::DecXEnd => "dec_x_end",
        }
    }

    pub fn build(self, curve_type: CurveType, exp: CurveSet) -> Box<dyn Constraint> {
        let (axis, increasing) = match self {
            Self::IncYEnd => (Axis::Y, true),
            Self::DecYEnd => (Axis::Y, false),
            Self::IncXEnd => (Axis::X, true),
            Self::DecXEnd => (Axis::X, false),
        };
        Box::new(EndOrdering::new(self, axis, increasing, curve_type, &exp))
    }
}

/// End values of consecutive (by stress) curves must not decrease, or must not
/// increase for the `dec_*` variants.
pub struct EndOrdering {
    kind: ConstraintKind,
    axis: Axis,
    increasing: bool,
    curve_type: CurveType,
    groups: Vec<Vec<usize>>,
}

impl EndOrdering {
    pub fn new(
        kind: ConstraintKind,
        axis: Axis,
        increasing: bool,
        curve_type: CurveType,
        exp: &[Curve],
    ) -> Self {
        // Filtering by type before pairing means a mismatched curve in the
        // middle of a group does not break the chain between its neighbours.
        let groups = curve_map(exp)
            .into_iter()
            .map(|group| {
                group
                    .indices
                    .into_iter()
                    .filter(|&i| exp[i].curve_type == curve_type)
                    .collect::<Vec<_>>()
            })
            .filter(|indices| indices.len() > 1)
            .collect();

        Self {
            kind,
            axis,
            increasing,
            curve_type,
            groups,
        }
    }
}

impl Constraint for EndOrdering {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn curve_type(&self) -> CurveType {
        self.curve_type
    }

    fn value(&self, prd: &[Curve]) -> f64 {
        let end = |i: usize| {
            prd.get(i)
                .and_then(|c| self.axis.end(c))
                .unwrap_or(f64::NAN)
        };

        let mut penalty = 0.0;
        for indices in &self.groups {
            for pair in indices.windows(2) {
                let (prev, next) = (end(pair[0]), end(pair[1]));
                let overshoot = if self.increasing { prev - next } else { next - prev };
                // NaN falls through here and is caught by the fitness check
                if !(overshoot <= 0.0) {
                    penalty += overshoot;
                }
            }
        }
        penalty
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn curve(curve_type: CurveType, stress: f64, temp: f64, y_end: f64) -> Curve {
        Curve::new(vec![0.0, 1.0], vec![0.0, y_end], curve_type, stress, temp, format!("{stress}@{temp}"))
            .unwrap()
    }

    fn creep_series(ends: &[f64]) -> Vec<Curve> {
        ends.iter()
            .enumerate()
            .map(|(i, &y)| curve(CurveType::Creep, 60.0 + 10.0 * i as f64, 800.0, y))
            .collect()
    }

    #[test]
    fn curve_map_groups_by_temperature_and_sorts_by_stress() {
        let curves = vec![
            curve(CurveType::Creep, 80.0, 800.0, 1.0),
            curve(CurveType::Creep, 200.0, 600.0, 1.0),
            curve(CurveType::Creep, 60.0, 800.0, 1.0),
            curve(CurveType::Creep, 70.0, 800.0, 1.0),
        ];
        let groups = curve_map(&curves);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].temp, 800.0);
        assert_eq!(groups[0].indices, vec![2, 3, 0]);
        assert_eq!(groups[1].indices, vec![1]);
    }

    #[test]
    fn inc_y_end_accepts_flat_series() {
        let exp = creep_series(&[5.0, 5.0, 5.0]);
        let constraint = ConstraintKind::IncYEnd.build(CurveType::Creep, Arc::new(exp.clone()));
        assert_eq!(constraint.value(&exp), 0.0);
    }

    #[test]
    fn inc_y_end_sums_the_violating_gap() {
        let exp = creep_series(&[1.0, 2.0, 3.0]);
        let prd = creep_series(&[5.0, 3.0, 5.0]);
        let constraint = ConstraintKind::IncYEnd.build(CurveType::Creep, Arc::new(exp));
        assert!((constraint.value(&prd) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn dec_variant_penalizes_increases() {
        let exp = creep_series(&[3.0, 2.0, 1.0]);
        let prd = creep_series(&[5.0, 3.0, 5.0]);
        let constraint = ConstraintKind::DecYEnd.build(CurveType::Creep, Arc::new(exp));
        assert!((constraint.value(&prd) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn dec_x_end_reads_the_time_axis() {
        let exp = creep_series(&[1.0, 1.0]);
        let mut prd = exp.clone();
        prd[0].x = vec![0.0, 100.0];
        prd[1].x = vec![0.0, 150.0];
        let constraint = ConstraintKind::DecXEnd.build(CurveType::Creep, Arc::new(exp));
        assert!((constraint.value(&prd) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn mismatched_types_are_skipped() {
        let exp = vec![
            curve(CurveType::Creep, 60.0, 800.0, 1.0),
            curve(CurveType::Tensile, 0.0, 800.0, 1.0),
            curve(CurveType::Creep, 80.0, 800.0, 1.0),
        ];
        let prd = vec![
            curve(CurveType::Creep, 60.0, 800.0, 2.0),
            curve(CurveType::Tensile, 0.0, 800.0, 100.0),
            curve(CurveType::Creep, 80.0, 800.0, 3.0),
        ];
        let constraint = ConstraintKind::IncYEnd.build(CurveType::Creep, Arc::new(exp.clone()));
        assert_eq!(constraint.value(&prd), 0.0);

        let tensile = ConstraintKind::IncYEnd.build(CurveType::Tensile, Arc::new(exp));
        assert_eq!(tensile.value(&prd), 0.0);
    }

    #[test]
    fn unknown_constraint_name() {
        assert_eq!(ConstraintKind::from_name("dec_x_end").unwrap(), ConstraintKind::DecXEnd);
        assert!(matches!(
            ConstraintKind::from_name("inc_area"),
            Err(FitError::UnknownConstraint(_))
        ));
    }
}
