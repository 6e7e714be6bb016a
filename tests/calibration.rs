//! End-to-end calibration runs on synthetic curves.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use creep_fit::app::pipeline;
use creep_fit::io::output::write_curves_csv;
use creep_fit::{Curve, CurveType, FitConfig, FitError, ModelAdapter};

const TRUE_PARAMS: [f64; 8] = [
    0.671972514,
    25.74997349,
    43.16881374,
    4.487884698,
    1669.850786,
    8000.0,
    4.0,
    4.0,
];

/// Write one CSV per synthetic creep curve into `dir`.
fn write_synthetic_curves(dir: &Path) -> Vec<Curve> {
    let conditions: Vec<Curve> = [70.0, 80.0]
        .into_iter()
        .map(|stress| Curve::condition(CurveType::Creep, stress, 800.0))
        .collect();
    let adapter =
        ModelAdapter::from_name("evpcd", &BTreeMap::new(), Arc::new(conditions.clone())).unwrap();
    let curves = adapter.predict(&TRUE_PARAMS, &conditions).unwrap().unwrap();
    for curve in &curves {
        let name = format!("Air_{}_{}_synthetic.csv", curve.temp, curve.stress);
        write_curves_csv(&dir.join(name), std::slice::from_ref(curve)).unwrap();
    }
    curves
}

fn load_config(dir: &Path, json: &str) -> FitConfig {
    let path = dir.join("fit.json");
    fs::write(&path, json).unwrap();
    FitConfig::load(&path).unwrap()
}

#[test]
fn generating_parameters_are_recovered_immediately() {
    let data = tempfile::tempdir().unwrap();
    write_synthetic_curves(data.path());
    let results = tempfile::tempdir().unwrap();

    let mut config = load_config(
        data.path(),
        &format!(
            r#"{{
                "model": {{"name": "evpcd"}},
                "train": ["Air_800_70_*.csv"],
                "validate": ["Air_800_80_*.csv"],
                "errors": [{{"name": "y_end"}}, {{"name": "x_end"}}, {{"name": "y_area"}}],
                "constraints": [],
                "solver": {{"kind": "pso", "generations": 5, "population": 6, "target_fitness": 1e-6}},
                "recorder": {{"interval": 1, "plot_interval": 1}},
                "threads": 1,
                "title": "synthetic",
                "initial_params": {TRUE_PARAMS:?}
            }}"#
        ),
    );
    config.output_dir = results.path().to_path_buf();

    let output = pipeline::run_calibration(&config).unwrap();
    assert_eq!(output.result.message, "Converged");
    assert_eq!(output.result.iterations, 1);
    assert!(output.record.fitness < 1e-6, "fitness {}", output.record.fitness);
    assert_eq!(output.record.params.len(), 8);

    let validation = output.record.validation.as_ref().unwrap();
    assert_eq!(validation.curves.len(), 1);
    assert!(validation.fitness < 1e-6);

    let run = output.run.path();
    assert!(run.starts_with(results.path()));
    assert!(run.to_string_lossy().ends_with(" (synthetic)"));
    for file in ["config.json", "params.json", "history.csv", "predictions.csv", "curves_creep.svg"] {
        assert!(run.join(file).exists(), "missing {file}");
    }
    assert!(!run.join("curves_tensile.svg").exists());
}

#[test]
fn evolutionary_search_respects_budget_and_bounds() {
    let data = tempfile::tempdir().unwrap();
    write_synthetic_curves(data.path());
    let results = tempfile::tempdir().unwrap();

    let mut config = load_config(
        data.path(),
        r#"{
            "model": {"name": "evpcd"},
            "train": ["*.csv"],
            "errors": [{"name": "y_end"}, {"name": "x_end"}],
            "constraints": [{"name": "inc_y_end"}],
            "solver": {"kind": "ga", "generations": 50, "population": 6, "offspring": 6,
                       "seed": 5, "max_evaluations": 18},
            "recorder": {"interval": 0, "plot_interval": 0},
            "worst_fitness": 1000.0,
            "threads": 1
        }"#,
    );
    config.output_dir = results.path().to_path_buf();

    let output = pipeline::run_calibration(&config).unwrap();
    assert_eq!(output.result.message, "Stopped by callback");
    assert!(output.record.evaluations >= 18);
    assert!(output.record.evaluations < 18 + 6 + 1);
    assert!(output.record.fitness.is_finite());

    let adapter_bounds = [
        (0.0, 100.0),
        (0.0, 100.0),
        (0.0, 100.0),
        (2.0, 10.0),
        (0.0, 1.0e6),
        (0.0, 1.0e4),
        (0.0, 100.0),
        (0.0, 100.0),
    ];
    for (param, (min, max)) in output.record.params.iter().zip(adapter_bounds) {
        assert!(param.value >= min && param.value <= max, "{} = {}", param.name, param.value);
    }

    let history = fs::read_to_string(output.run.path().join("history.csv")).unwrap();
    let fitness: Vec<f64> = history
        .lines()
        .skip(1)
        .map(|line| line.split(',').nth(2).unwrap().parse().unwrap())
        .collect();
    assert!(!fitness.is_empty());
    assert!(fitness.windows(2).all(|w| w[1] <= w[0]));
}

#[test]
fn missing_training_files_fail_before_any_output() {
    let data = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    let mut config = load_config(
        data.path(),
        r#"{"model": {"name": "evpwd_s"}, "train": ["*.csv"]}"#,
    );
    config.output_dir = results.path().join("out");

    let err = pipeline::run_calibration(&config).unwrap_err();
    assert!(matches!(err, FitError::NoMatch(_)));
    assert_eq!(err.exit_code(), 3);
    assert!(!config.output_dir.exists());
}
