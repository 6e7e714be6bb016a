//! SVG figures: experimental against predicted curves, and parameter scatter.

use std::path::Path;

use plotters::prelude::*;

use crate::core::{Curve, CurveType};
use crate::error::{FitError, FitResult};

const SIZE: (u32, u32) = (1000, 700);
const PALETTE: [RGBColor; 6] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
];

fn plot_error(path: &Path, err: impl std::fmt::Display) -> FitError {
    FitError::Plot {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn extent<'a>(values: impl Iterator<Item = &'a f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if lo > hi {
        return None;
    }
    if hi - lo < 1e-12 {
        return Some((lo - 0.5, hi + 0.5));
    }
    let pad = 0.05 * (hi - lo);
    Some((lo - pad, hi + pad))
}

/// Draw experimental curves as markers and predictions as lines, one colour
/// per test, for every curve of `curve_type`.
///
/// Nothing is written when no experimental curve has that type.
pub fn plot_curves(
    path: &Path,
    curve_type: CurveType,
    experimental: &[Curve],
    predicted: Option<&[Curve]>,
) -> FitResult<bool> {
    let exp: Vec<&Curve> = experimental.iter().filter(|c| c.curve_type == curve_type).collect();
    if exp.is_empty() {
        return Ok(false);
    }
    let prd: Vec<&Curve> = predicted
        .unwrap_or_default()
        .iter()
        .filter(|c| c.curve_type == curve_type)
        .collect();

    let everything = || exp.iter().chain(prd.iter());
    let Some((x0, x1)) = extent(everything().flat_map(|c| c.x.iter())) else {
        return Ok(false);
    };
    let Some((y0, y1)) = extent(everything().flat_map(|c| c.y.iter())) else {
        return Ok(false);
    };

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| plot_error(path, e))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{curve_type} curves"), ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(70)
        .build_cartesian_2d(x0..x1, y0..y1)
        .map_err(|e| plot_error(path, e))?;

    let (x_desc, y_desc) = curve_type.default_labels();
    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()
        .map_err(|e| plot_error(path, e))?;

    for (k, curve) in exp.iter().enumerate() {
        let color = PALETTE[k % PALETTE.len()];
        chart
            .draw_series(curve.points().map(|p| Circle::new(p, 2, color.filled())))
            .map_err(|e| plot_error(path, e))?
            .label(format!("{} ({} MPa, {} °C)", curve.test_id, curve.stress, curve.temp))
            .legend(move |(x, y)| Circle::new((x + 10, y), 3, color.filled()));

        // Predictions line up with experimental curves by test id
        if let Some(model) = prd.iter().find(|p| p.test_id == curve.test_id) {
            chart
                .draw_series(LineSeries::new(model.points(), color.stroke_width(2)))
                .map_err(|e| plot_error(path, e))?;
        }
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| plot_error(path, e))?;
    root.present().map_err(|e| plot_error(path, e))?;
    Ok(true)
}

/// Scatter of one parameter's sampled values against whether the model run
/// gave a usable prediction (1) or not (0).
pub fn plot_validity(path: &Path, names: &[String], samples: &[(Vec<f64>, bool)]) -> FitResult<()> {
    let rows = names.len().max(1);
    let root = SVGBackend::new(path, (SIZE.0, 160 * rows as u32)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| plot_error(path, e))?;

    for (i, (area, name)) in root.split_evenly((rows, 1)).iter().zip(names).enumerate() {
        let Some((x0, x1)) = extent(samples.iter().map(|(params, _)| &params[i])) else {
            continue;
        };
        let mut chart = ChartBuilder::on(area)
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(50)
            .build_cartesian_2d(x0..x1, -0.2..1.2)
            .map_err(|e| plot_error(path, e))?;
        chart
            .configure_mesh()
            .x_desc(name.as_str())
            .y_desc("valid")
            .y_labels(2)
            .draw()
            .map_err(|e| plot_error(path, e))?;

        chart
            .draw_series(samples.iter().map(|(params, valid)| {
                let (y, color) = if *valid { (1.0, PALETTE[2]) } else { (0.0, PALETTE[3]) };
                Circle::new((params[i], y), 2, color.filled())
            }))
            .map_err(|e| plot_error(path, e))?;
    }

    root.present().map_err(|e| plot_error(path, e))
}

/// Pairwise parameter scatter, green where the run was usable and red where
/// it was not. Panel (i, j) plots parameter j against parameter i.
pub fn plot_dependency(path: &Path, names: &[String], samples: &[(Vec<f64>, bool)]) -> FitResult<()> {
    let n = names.len().max(1);
    let side = (260 * n as u32).min(4000);
    let root = SVGBackend::new(path, (side, side)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| plot_error(path, e))?;

    let ranges: Vec<Option<(f64, f64)>> = (0..names.len())
        .map(|i| extent(samples.iter().map(|(params, _)| &params[i])))
        .collect();

    for (k, area) in root.split_evenly((n, n)).iter().enumerate() {
        let (i, j) = (k / n, k % n);
        let (Some(Some(xr)), Some(Some(yr))) = (ranges.get(i), ranges.get(j)) else {
            continue;
        };
        let mut chart = ChartBuilder::on(area)
            .caption(format!("{} : {}", names[i], names[j]), ("sans-serif", 14))
            .margin(6)
            .x_label_area_size(20)
            .y_label_area_size(36)
            .build_cartesian_2d(xr.0..xr.1, yr.0..yr.1)
            .map_err(|e| plot_error(path, e))?;
        chart
            .configure_mesh()
            .x_labels(3)
            .y_labels(3)
            .draw()
            .map_err(|e| plot_error(path, e))?;
        chart
            .draw_series(samples.iter().map(|(params, valid)| {
                let color = if *valid { PALETTE[2] } else { PALETTE[3] };
                Circle::new((params[i], params[j]), 2, color.filled())
            }))
            .map_err(|e| plot_error(path, e))?;
    }

    root.present().map_err(|e| plot_error(path, e))
}
